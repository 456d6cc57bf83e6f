use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use deaddrop_engine::LifecycleEngine;

/// Background task that sweeps dead drops.
///
/// Runs on an interval and purges every drop that is expired or has spent
/// its download budget. The cron endpoint triggers the same sweep; running
/// both at once is safe.
pub async fn run_cleanup_loop(engine: LifecycleEngine, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        match engine.sweep_expired(Utc::now()).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: purged {} dead drops", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}
