use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use crate::extract::extract_bundles;
use crate::pagination::reveal_all;
use crate::parse::parse_bundle;
use crate::popup::dismiss_popup;
use crate::reconcile::{ReconcileGateway, ReconcileReport};
use crate::traits::{BrowserPage, Pacing, SourceConfig};

/// Navigation must complete within this window or the run aborts; no retry
/// happens at this layer.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(15);

const SCROLL_HALFWAY: &str = "window.scrollTo(0, document.body.scrollHeight / 2)";
const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// One-run orchestrator: navigate, settle, clear popups, paginate, extract,
/// parse, reconcile. All intermediate state lives in locals; the harvester
/// itself only carries configuration and the gateway.
#[derive(Clone)]
pub struct VoucherHarvester {
    config: SourceConfig,
    pacing: Pacing,
    gateway: ReconcileGateway,
    diagnostics_dir: PathBuf,
}

impl VoucherHarvester {
    pub fn new(config: SourceConfig, pacing: Pacing, gateway: ReconcileGateway) -> Self {
        Self {
            config,
            pacing,
            gateway,
            diagnostics_dir: PathBuf::from("."),
        }
    }

    #[cfg(test)]
    fn with_diagnostics_dir(mut self, dir: PathBuf) -> Self {
        self.diagnostics_dir = dir;
        self
    }

    /// Run the full pipeline once against `page`.
    ///
    /// Navigation timeout is fatal and surfaces to the caller; everything
    /// downstream degrades to partial data instead of failing.
    pub async fn run(&self, page: &dyn BrowserPage) -> Result<ReconcileReport> {
        info!("Harvesting {} ({})", self.config.name, self.config.url);

        page.navigate(&self.config.url, NAVIGATION_TIMEOUT).await?;
        tokio::time::sleep(self.pacing.initial_settle).await;

        // Scroll in two steps to trigger lazy loading tied to scroll position.
        let _ = page.evaluate(SCROLL_HALFWAY).await;
        tokio::time::sleep(self.pacing.scroll_pause).await;
        let _ = page.evaluate(SCROLL_TO_BOTTOM).await;
        tokio::time::sleep(self.pacing.scroll_pause).await;

        let dismissal = dismiss_popup(page, &self.config.selectors, &self.pacing).await;
        debug!("initial popup check: {}", dismissal.label());

        let rounds = reveal_all(page, &self.config.selectors, &self.pacing).await;
        debug!("pagination finished after {rounds} load-more clicks");

        let bundles = extract_bundles(page, &self.config, &self.diagnostics_dir).await?;
        info!("extracted {} voucher elements", bundles.len());

        let now = Utc::now();
        let records: Vec<_> = bundles
            .iter()
            .map(|bundle| parse_bundle(bundle, self.config.platform, now))
            .collect();

        let report = self.gateway.reconcile(&records).await?;
        info!(
            "Harvest of {} done: {} found, {} new, {} updated, {} skipped",
            self.config.name, report.found, report.inserted, report.updated, report.skipped
        );
        Ok(report)
    }
}
