use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::store::WalStore;

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}

/// Returns true when a compaction ran and succeeded.
pub async fn compact_if_due(store: &WalStore, threshold: u64) -> bool {
    let appends = match store.wal_appends_since_compact().await {
        Ok(n) => n,
        Err(e) => {
            tracing::error!("cannot read WAL append count: {e}");
            return false;
        }
    };
    if appends < threshold {
        return false;
    }
    match store.compact_wal().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
            info!(
                "compacted WAL after {appends} appends: {} rooms, {} meetings",
                store.room_count(),
                store.meeting_count()
            );
            true
        }
        Err(e) => {
            tracing::error!("WAL compaction failed: {e}");
            false
        }
    }
}
