use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::error::AppResult;
use crate::storage::Store;

/// Background task that removes soft-deleted visitors for good once they are
/// older than `soft_deleted_days`.
pub async fn retention_loop(store: Arc<Store>, soft_deleted_days: u64, interval_secs: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        match run_retention_once(&store, soft_deleted_days).await {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::info!(deleted, "pruned soft-deleted visitors");
                }
            }
            Err(e) => tracing::error!(error = %e, "retention prune failed"),
        }
    }
}

/// Run a single retention pass. Returns the number of rows removed.
pub async fn run_retention_once(store: &Store, soft_deleted_days: u64) -> AppResult<usize> {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(soft_deleted_days as i64);
    store.purge_soft_deleted(cutoff).await
}
