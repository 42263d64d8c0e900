//! Pagination driver: clicks the "load more" affordance until the full
//! result set is revealed or a safety bound is hit.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::popup::dismiss_popup;
use crate::traits::{BrowserPage, ElementHandle, PageSelectors, Pacing};

/// Safety bound; partial data beats an unbounded loop.
pub const MAX_LOAD_MORE_ROUNDS: usize = 50;

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Keep revealing listings until the load-more control disappears, stops
/// rendering, errors out, or the round bound is reached. Returns the number
/// of successful clicks. Never fails the run.
pub async fn reveal_all(
    page: &dyn BrowserPage,
    selectors: &PageSelectors,
    pacing: &Pacing,
) -> usize {
    let mut clicks = 0;

    for round in 0..MAX_LOAD_MORE_ROUNDS {
        // The overlay can reappear between rounds.
        let dismissal = dismiss_popup(page, selectors, pacing).await;
        debug!(round, "popup check: {}", dismissal.label());

        match load_more_round(page, selectors, pacing).await {
            Ok(true) => clicks += 1,
            Ok(false) => {
                info!("load-more exhausted after {clicks} clicks");
                return clicks;
            }
            Err(e) => {
                warn!("load-more round failed, treating as exhausted: {e:#}");
                return clicks;
            }
        }
    }

    warn!("reached load-more safety bound of {MAX_LOAD_MORE_ROUNDS} rounds, extraction continues with partial data");
    clicks
}

/// One round: locate, check visibility, click, let content render.
/// `Ok(false)` means exhaustion.
async fn load_more_round(
    page: &dyn BrowserPage,
    selectors: &PageSelectors,
    pacing: &Pacing,
) -> Result<bool> {
    let Some(control) = find_load_more(page, selectors).await? else {
        return Ok(false);
    };

    if !page.is_visible(control).await? {
        return Ok(false);
    }

    page.scroll_into_view(control).await?;
    tokio::time::sleep(pacing.click_settle).await;

    page.click(control).await?;
    tokio::time::sleep(pacing.render_wait).await;

    // Nudge any scroll-position lazy loading as well.
    page.evaluate(SCROLL_TO_BOTTOM).await?;
    tokio::time::sleep(pacing.scroll_pause).await;

    Ok(true)
}

async fn find_load_more(
    page: &dyn BrowserPage,
    selectors: &PageSelectors,
) -> Result<Option<ElementHandle>> {
    for selector in &selectors.load_more {
        if let Some(control) = page.query_one(selector).await? {
            return Ok(Some(control));
        }
    }
    Ok(None)
}
