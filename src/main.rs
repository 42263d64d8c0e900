use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

mod browser;
mod database;
mod extract;
mod harvester;
mod models;
mod pagination;
mod parse;
mod popup;
mod reconcile;
mod traits;

use browser::StaticPage;
use database::Database;
use harvester::VoucherHarvester;
use models::Platform;
use reconcile::{MatchStrategy, ReconcileGateway};
use traits::{Pacing, SourceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    info!("Starting voucher harvest pipeline");

    let database = Database::new().await?;

    let mut source = SourceConfig::bloggiamgia(Platform::Shopee);
    if let Ok(url) = std::env::var("SOURCE_URL") {
        source.url = url;
    }

    let gateway = ReconcileGateway::new(database, MatchStrategy::IdentityLink);
    let harvester = VoucherHarvester::new(source, Pacing::default(), gateway);
    let page = Arc::new(StaticPage::new()?);

    // Run once immediately
    if let Err(e) = harvester.run(page.as_ref()).await {
        error!("Error during initial harvest: {e:#}");
    }

    // Hourly by default; override with HARVEST_CRON
    let cron = std::env::var("HARVEST_CRON").unwrap_or_else(|_| "0 0 * * * *".to_string());

    let sched = JobScheduler::new().await?;
    let job_harvester = harvester.clone();
    let job_page = page.clone();
    sched
        .add(Job::new_async(cron.as_str(), move |_uuid, _l| {
            let harvester = job_harvester.clone();
            let page = job_page.clone();
            Box::pin(async move {
                if let Err(e) = harvester.run(page.as_ref()).await {
                    error!("Error during scheduled harvest: {e:#}");
                }
            })
        })?)
        .await?;

    info!("Scheduler started with cadence '{cron}'");
    sched.start().await?;

    // Keep the program running
    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
    }
}
