use std::time::Duration;

use anyhow::Result;
use build_catalog_sync::{CatalogService, Scheduler};
use tracing::info;

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(600);

/// Run the scheduler until Ctrl-C, logging its status periodically.
pub async fn run(service: &CatalogService, mut scheduler: Scheduler) -> Result<()> {
    scheduler.start();

    let mut ticker = tokio::time::interval(STATUS_LOG_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => log_status(service),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown requested; waiting for any in-progress sync");
                break;
            }
        }
    }

    scheduler.stop().await;
    log_status(service);
    Ok(())
}

fn log_status(service: &CatalogService) {
    let status = service.scheduler_status();
    info!(
        "Scheduler status: running={}, sync_in_progress={}, last_success={:?}, next_due={:?}, last_error={:?}",
        status.running,
        status.sync_in_progress,
        status.last_success,
        status.next_due,
        status.last_error
    );
}
