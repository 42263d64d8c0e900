//! Traits and configuration for the browser automation boundary

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Platform;

/// Opaque handle to a DOM element held by the page implementation.
///
/// Handles are only valid until the next navigation; implementations are free
/// to invalidate them on `navigate`.
pub type ElementHandle = u64;

/// The browser capability the pipeline runs against.
///
/// Implementations may be a real driven browser, a statically fetched page
/// ([`crate::browser::StaticPage`]) or a scriptable test double. Every call
/// is a suspension point; the pipeline never issues two interactions against
/// the same page concurrently.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate to `url`, aborting with an error once `timeout` elapses.
    /// Navigation failure is fatal to the run; no retry happens at this layer.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// First element matching `selector`, if any.
    async fn query_one(&self, selector: &str) -> Result<Option<ElementHandle>>;

    /// All elements matching `selector`, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>>;

    /// First descendant of `element` matching `selector`.
    async fn query_within(
        &self,
        element: ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>>;

    /// All descendants of `element` matching `selector`.
    async fn query_all_within(
        &self,
        element: ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>>;

    /// Concatenated text content of `element`, trimmed.
    async fn text(&self, element: ElementHandle) -> Result<String>;

    /// Attribute value on `element`, if set.
    async fn attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>>;

    /// Whether `element` currently renders: non-zero size, not hidden via
    /// style, and not nested inside a modal/dialog ancestor.
    async fn is_visible(&self, element: ElementHandle) -> Result<bool>;

    async fn click(&self, element: ElementHandle) -> Result<()>;

    /// Click at viewport coordinates, used for backdrop dismissal where no
    /// dedicated close control exists.
    async fn click_at(&self, x: f64, y: f64) -> Result<()>;

    async fn scroll_into_view(&self, element: ElementHandle) -> Result<()>;

    /// Evaluate a script in page context and return its JSON value.
    /// Non-JS implementations return `null`.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Evaluate a script against `element` in page context.
    async fn evaluate_on(
        &self,
        element: ElementHandle,
        script: &str,
    ) -> Result<serde_json::Value>;

    /// Full page HTML, for offline diagnostics.
    async fn content(&self) -> Result<String>;

    /// Full-page screenshot written to `path`. Implementations without a
    /// renderer may return an error; callers treat screenshots as best-effort.
    async fn screenshot(&self, path: &Path) -> Result<()>;
}

/// CSS selectors for the pieces of the aggregator page the pipeline touches.
#[derive(Debug, Clone)]
pub struct PageSelectors {
    /// Voucher container candidates, tried in priority order until one
    /// yields visible matches.
    pub voucher_containers: Vec<String>,
    /// Supplier name candidates within a voucher element, first match wins.
    pub supplier: Vec<String>,
    /// Supplier logo `img` within a voucher element.
    pub supplier_logo: String,
    /// The bold/emphasized discount text.
    pub discount: String,
    /// Candidate rows that may carry the minimum-order label.
    pub min_order_rows: String,
    /// Label prefixing the minimum-order value inside a matching row.
    pub min_order_label: String,
    /// Availability ("remaining") text within a voucher element.
    pub availability: String,
    /// Note/description text.
    pub note: String,
    /// Trailing call-to-action suffix stripped from the note.
    pub note_suffix: String,
    /// Container whose last span holds the expiry text.
    pub expiry_container: String,
    /// Apply-link anchor; `{platform}` is replaced by the platform's URL
    /// fragment.
    pub apply_link: String,
    /// Banner anchor; falls back to the apply link when absent.
    pub banner_link: String,
    /// Labeled coupon-code element candidates.
    pub coupon_code: String,
    /// Popup overlay root.
    pub popup_root: String,
    /// Close icon rendered inside the popup image.
    pub popup_image_close: String,
    /// Close button in the popup header.
    pub popup_header_close: String,
    /// Generic header close icon, last selector-based resort.
    pub popup_generic_close: String,
    /// "Load more" control candidates, primary first.
    pub load_more: Vec<String>,
}

impl PageSelectors {
    /// Selector set for bloggiamgia.vn voucher pages.
    pub fn bloggiamgia(platform: Platform) -> Self {
        Self {
            voucher_containers: [
                ".ticket-wrap",
                ".ticket",
                "[class*='ticket']",
                ".item-voucher",
                ".voucher-item",
                ".deal-item",
                ".coupon-item",
            ]
            .map(String::from)
            .to_vec(),
            supplier: [
                ".logo-supplier .font-semibold",
                ".mini-title-supplier span",
            ]
            .map(String::from)
            .to_vec(),
            supplier_logo: ".logo-supplier img, .mini-title-supplier img".to_string(),
            discount: ".font-bold[style*='color'], .text-lg.font-bold, .text-2xl.font-bold"
                .to_string(),
            min_order_rows: ".text-xs.mb-1".to_string(),
            min_order_label: "ĐH tối thiểu:".to_string(),
            availability: ".used-progress span, [class*='available']".to_string(),
            note: ".italic.text-xs.text-left".to_string(),
            note_suffix: "Xem chi tiết".to_string(),
            expiry_container: ".expried-date".to_string(),
            apply_link: format!("a.italic.underline[href*='{}']", platform.link_fragment()),
            banner_link: "a.banner-link, a[class*='FF9900']".to_string(),
            coupon_code: ".code, .coupon-code, [class*='code']".to_string(),
            popup_root: ".el-dialog__wrapper".to_string(),
            popup_image_close: ".el-dialog img.close-icon, .el-dialog .popup-close".to_string(),
            popup_header_close: ".el-dialog__headerbtn".to_string(),
            popup_generic_close: ".el-dialog__header .el-icon-close, [class*='close']".to_string(),
            load_more: [
                ".load-more-voucher",
                "div.see-more",
                "[class*='load-more']",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// One aggregator source page to harvest.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Display name for logging.
    pub name: String,
    /// Page URL to navigate to.
    pub url: String,
    /// Platform the page's vouchers belong to.
    pub platform: Platform,
    pub selectors: PageSelectors,
}

impl SourceConfig {
    pub fn bloggiamgia(platform: Platform) -> Self {
        Self {
            name: "bloggiamgia".to_string(),
            url: format!("https://bloggiamgia.vn/{}", platform.link_fragment()),
            platform,
            selectors: PageSelectors::bloggiamgia(platform),
        }
    }
}

/// Fixed pauses that let client-side rendering settle after an interaction.
/// Not adaptive and not retried; tests run with [`Pacing::none`].
#[derive(Debug, Clone)]
pub struct Pacing {
    /// After navigation, before touching the page.
    pub initial_settle: Duration,
    /// Between scroll steps that trigger lazy loading.
    pub scroll_pause: Duration,
    /// Grace period for the popup overlay to appear.
    pub popup_grace: Duration,
    /// After scrolling the load-more control into view, before clicking.
    pub click_settle: Duration,
    /// After a load-more click, for new content to render.
    pub render_wait: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            initial_settle: Duration::from_secs(3),
            scroll_pause: Duration::from_secs(1),
            popup_grace: Duration::from_millis(1500),
            click_settle: Duration::from_millis(500),
            render_wait: Duration::from_secs(3),
        }
    }
}

impl Pacing {
    /// Zero pauses for tests against scriptable pages.
    pub fn none() -> Self {
        Self {
            initial_settle: Duration::ZERO,
            scroll_pause: Duration::ZERO,
            popup_grace: Duration::ZERO,
            click_settle: Duration::ZERO,
            render_wait: Duration::ZERO,
        }
    }
}
