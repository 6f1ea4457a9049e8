use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::TokenStore;

use super::registry::DownloadRegistry;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Periodically purge expired tokens and download records.
pub fn spawn_sweeper(
    tokens: Arc<TokenStore>,
    registry: Arc<DownloadRegistry>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let tokens_removed = tokens.purge_expired();
            let records_removed = registry.purge_expired();
            tracing::debug!(tokens_removed, records_removed, "Sweep finished");
        }
    })
}
