use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::engine::{Engine, EngineError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites a tenant's WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        match compact_if_due(&engine, threshold).await {
            Ok(true) => info!("compacted WAL after {threshold}+ appends"),
            Ok(false) => {}
            Err(e) if e.is_retryable() => warn!("compaction failed, will retry: {e}"),
            Err(e) => error!("compaction failed: {e}"),
        }
    }
}

/// Compact when at least `threshold` appends landed since the last rewrite.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    if engine.wal_appends_since_compact().await < threshold {
        return Ok(false);
    }
    engine.compact_wal().await?;
    Ok(true)
}
