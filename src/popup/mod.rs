//! Popup dismissal: an ordered fallback chain for the obstructive overlay
//! the aggregator shows on or shortly after page load.
//!
//! The overlay can reappear, so the driver runs this before every pagination
//! click. Failing to clear it is never fatal; extraction proceeds against
//! whatever the page shows.

use tracing::{debug, warn};

use crate::traits::{BrowserPage, PageSelectors, Pacing};

/// Where the backdrop click lands; far enough into the corner to miss the
/// centered inner dialog.
const BACKDROP_CLICK_AT: (f64, f64) = (10.0, 10.0);

const FORCE_HIDE_SCRIPT: &str = "el => { el.style.display = 'none'; }";

/// Terminal outcome of one dismissal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dismissal {
    /// Overlay root never appeared.
    NotPresent,
    /// Clicked the close icon inside the popup image.
    ImageClose,
    /// Clicked the header close button.
    HeaderButton,
    /// Clicked a generic header close icon.
    GenericIcon,
    /// Clicked the backdrop outside the inner dialog.
    BackdropClick,
    /// Hid the overlay by manipulating its style directly.
    ForceHide,
    /// Every method failed; the overlay may still be up.
    Exhausted,
}

impl Dismissal {
    pub fn label(self) -> &'static str {
        match self {
            Self::NotPresent => "not present",
            Self::ImageClose => "image close icon",
            Self::HeaderButton => "header close button",
            Self::GenericIcon => "generic close icon",
            Self::BackdropClick => "backdrop click",
            Self::ForceHide => "force hide",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Try to clear the overlay, first close control that works wins.
pub async fn dismiss_popup(
    page: &dyn BrowserPage,
    selectors: &PageSelectors,
    pacing: &Pacing,
) -> Dismissal {
    // Grace period for the overlay to mount.
    tokio::time::sleep(pacing.popup_grace).await;

    let root = match page.query_one(&selectors.popup_root).await {
        Ok(Some(root)) => root,
        Ok(None) => return Dismissal::NotPresent,
        Err(e) => {
            warn!("popup root lookup failed: {e:#}");
            return Dismissal::Exhausted;
        }
    };

    let close_methods = [
        (&selectors.popup_image_close, Dismissal::ImageClose),
        (&selectors.popup_header_close, Dismissal::HeaderButton),
        (&selectors.popup_generic_close, Dismissal::GenericIcon),
    ];

    for (selector, outcome) in close_methods {
        if try_click(page, selector).await {
            debug!("popup dismissed via {}", outcome.label());
            return outcome;
        }
    }

    let (x, y) = BACKDROP_CLICK_AT;
    if page.click_at(x, y).await.is_ok() {
        debug!("popup dismissed via backdrop click");
        return Dismissal::BackdropClick;
    }

    if page.evaluate_on(root, FORCE_HIDE_SCRIPT).await.is_ok() {
        debug!("popup dismissed via force hide");
        return Dismissal::ForceHide;
    }

    warn!("popup could not be dismissed, continuing anyway");
    Dismissal::Exhausted
}

async fn try_click(page: &dyn BrowserPage, selector: &str) -> bool {
    match page.query_one(selector).await {
        Ok(Some(element)) => page.click(element).await.is_ok(),
        Ok(None) => false,
        Err(e) => {
            debug!("close control lookup '{selector}' failed: {e:#}");
            false
        }
    }
}
