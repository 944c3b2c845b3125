use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cyder_tools::log::{error, info};
use tokio::task::JoinHandle;

use crate::service::store::GatewayStore;

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
const DAY_MS: i64 = 86_400_000;

/// Deletes stored bodies older than `retention_days`. Zero keeps them forever.
pub async fn purge_expired_details(store: &dyn GatewayStore, retention_days: u32, now: i64) -> usize {
    if retention_days == 0 {
        return 0;
    }
    let cutoff = now - i64::from(retention_days) * DAY_MS;
    match store.delete_log_details_before(cutoff).await {
        Ok(removed) => {
            if removed > 0 {
                info!("Removed {} request bodies older than {} days", removed, retention_days);
            }
            removed
        }
        Err(e) => {
            error!("Failed to purge old request bodies: {}", e);
            0
        }
    }
}

pub fn spawn_retention_task(store: Arc<dyn GatewayStore>, retention_days: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            purge_expired_details(store.as_ref(), retention_days, Utc::now().timestamp_millis()).await;
        }
    })
}
