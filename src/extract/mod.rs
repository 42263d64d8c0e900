//! Extraction engine: walks the fully paginated page and emits one raw
//! field bundle per visible voucher element.
//!
//! Every field is independently best-effort. A sub-element missing from one
//! voucher never aborts that voucher, let alone the run.

use std::path::Path;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::models::RawVoucherBundle;
use crate::traits::{BrowserPage, ElementHandle, SourceConfig};

/// "Mã: SAVE50", "Code: ABC123", "MA:XYZ" style patterns in the element's
/// free text, for vouchers without a labeled code sub-element.
static CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:Mã|Code|MA):\s*([A-Z0-9]+)").expect("valid regex"));

const SCREENSHOT_FILE: &str = "page_screenshot.png";
const HTML_DUMP_FILE: &str = "page_content.html";

/// Enumerate visible voucher elements and extract their raw fields.
///
/// Container selectors are tried in priority order until one yields visible
/// matches. When none does, a diagnostic screenshot and HTML dump land in
/// `diagnostics_dir` and the result is empty. The caller decides whether an
/// empty harvest is noteworthy.
pub async fn extract_bundles(
    page: &dyn BrowserPage,
    config: &SourceConfig,
    diagnostics_dir: &Path,
) -> Result<Vec<RawVoucherBundle>> {
    let Some((selector, elements)) = find_voucher_elements(page, config).await? else {
        warn!(
            "no visible voucher elements on {}, tried selectors: {}",
            config.name,
            config.selectors.voucher_containers.join(", ")
        );
        dump_diagnostics(page, diagnostics_dir).await;
        return Ok(Vec::new());
    };

    info!(
        "extracting {} voucher elements from {} via '{selector}'",
        elements.len(),
        config.name
    );

    let mut bundles = Vec::with_capacity(elements.len());
    for element in elements {
        bundles.push(extract_one(page, config, element).await);
    }
    Ok(bundles)
}

async fn find_voucher_elements(
    page: &dyn BrowserPage,
    config: &SourceConfig,
) -> Result<Option<(String, Vec<ElementHandle>)>> {
    for selector in &config.selectors.voucher_containers {
        let candidates = page.query_all(selector).await?;
        let mut visible = Vec::with_capacity(candidates.len());
        for element in candidates {
            // Visibility check failures count as invisible.
            if page.is_visible(element).await.unwrap_or(false) {
                visible.push(element);
            }
        }
        if !visible.is_empty() {
            return Ok(Some((selector.clone(), visible)));
        }
        debug!("selector '{selector}' yielded no visible elements");
    }
    Ok(None)
}

/// Extract one voucher element into a raw bundle. Missing sub-elements yield
/// empty/absent fields.
async fn extract_one(
    page: &dyn BrowserPage,
    config: &SourceConfig,
    element: ElementHandle,
) -> RawVoucherBundle {
    let selectors = &config.selectors;

    let mut supplier = None;
    for candidate in &selectors.supplier {
        if let Some(name) = text_of(page, element, candidate).await {
            supplier = Some(name);
            break;
        }
    }

    let discount_text = text_of(page, element, &selectors.discount)
        .await
        .unwrap_or_default();

    let apply_link = attr_of(page, element, &selectors.apply_link, "href").await;
    let banner_link = attr_of(page, element, &selectors.banner_link, "href")
        .await
        .or_else(|| apply_link.clone());

    let coupon_code = if discount_text.contains('%') {
        None
    } else {
        extract_coupon_code(page, element, &selectors.coupon_code).await
    };

    RawVoucherBundle {
        supplier: supplier.unwrap_or_else(|| "Unknown".to_string()),
        supplier_logo: attr_of(page, element, &selectors.supplier_logo, "src").await,
        discount_text,
        minimum_order: extract_min_order(page, element, config).await,
        availability: text_of(page, element, &selectors.availability).await,
        note: extract_note(page, element, config).await,
        expiry_text: extract_expiry(page, element, config).await,
        apply_link,
        banner_link,
        coupon_code,
    }
}

/// The minimum order value shares a row with its label; find the labeled row
/// and keep the remainder.
async fn extract_min_order(
    page: &dyn BrowserPage,
    element: ElementHandle,
    config: &SourceConfig,
) -> Option<String> {
    let selectors = &config.selectors;
    let rows = page
        .query_all_within(element, &selectors.min_order_rows)
        .await
        .ok()?;

    for row in rows {
        let Ok(text) = page.text(row).await else {
            continue;
        };
        if let Some(position) = text.find(&selectors.min_order_label) {
            let value = text[position + selectors.min_order_label.len()..].trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

async fn extract_note(
    page: &dyn BrowserPage,
    element: ElementHandle,
    config: &SourceConfig,
) -> Option<String> {
    let note = text_of(page, element, &config.selectors.note).await?;
    let stripped = note
        .strip_suffix(&config.selectors.note_suffix)
        .map(|s| s.trim_end().to_string())
        .unwrap_or(note);
    (!stripped.is_empty()).then_some(stripped)
}

/// The expiry container holds a label span followed by the date span; the
/// date is the last one. A container with only the label span carries no
/// date at all.
async fn extract_expiry(
    page: &dyn BrowserPage,
    element: ElementHandle,
    config: &SourceConfig,
) -> Option<String> {
    let container = page
        .query_within(element, &config.selectors.expiry_container)
        .await
        .ok()??;
    let spans = page.query_all_within(container, "span").await.ok()?;
    if spans.len() < 2 {
        return None;
    }
    let last = *spans.last()?;
    let text = page.text(last).await.ok()?;
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

async fn extract_coupon_code(
    page: &dyn BrowserPage,
    element: ElementHandle,
    code_selector: &str,
) -> Option<String> {
    if let Some(code) = text_of(page, element, code_selector).await {
        return Some(code);
    }

    // No labeled element; scan the element's full text for a code pattern.
    let text = page.text(element).await.ok()?;
    CODE_PATTERN
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

async fn text_of(
    page: &dyn BrowserPage,
    element: ElementHandle,
    selector: &str,
) -> Option<String> {
    let target = page.query_within(element, selector).await.ok()??;
    let text = page.text(target).await.ok()?;
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

async fn attr_of(
    page: &dyn BrowserPage,
    element: ElementHandle,
    selector: &str,
    name: &str,
) -> Option<String> {
    let target = page.query_within(element, selector).await.ok()??;
    page.attribute(target, name)
        .await
        .ok()?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Best-effort screenshot + HTML dump for offline debugging when a page
/// yields nothing. Not part of the data contract.
async fn dump_diagnostics(page: &dyn BrowserPage, dir: &Path) {
    let screenshot = dir.join(SCREENSHOT_FILE);
    if let Err(e) = page.screenshot(&screenshot).await {
        warn!("could not capture diagnostic screenshot: {e:#}");
    } else {
        info!("diagnostic screenshot saved to {}", screenshot.display());
    }

    match page.content().await {
        Ok(html) => {
            let dump = dir.join(HTML_DUMP_FILE);
            if let Err(e) = tokio::fs::write(&dump, html).await {
                warn!("could not write diagnostic HTML dump: {e:#}");
            } else {
                info!("diagnostic HTML dump saved to {}", dump.display());
            }
        }
        Err(e) => warn!("could not read page content for diagnostics: {e:#}"),
    }
}
