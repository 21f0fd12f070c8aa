//! WebSocket broadcast functionality.
//!
//! The broadcaster polls the store revision at a fixed interval and pushes a
//! fresh snapshot to all connected clients only when it changed.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::state::DashboardState;
use crate::types::DashboardMessage;

/// Run the broadcaster task until cancelled.
pub async fn run_broadcaster(
    state: DashboardState,
    tx: broadcast::Sender<String>,
    interval_ms: u64,
    shutdown_token: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    let mut last_revision = state.revision();

    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => {
                debug!("Broadcaster cancelled");
                return;
            }
            _ = interval.tick() => {}
        }

        let revision = state.revision();
        if revision == last_revision {
            continue;
        }
        last_revision = revision;

        let msg = DashboardMessage::Snapshot(state.collect_snapshot());
        match serde_json::to_string(&msg) {
            Ok(json) => match tx.send(json) {
                Ok(n) => trace!(receivers = n, revision, "Broadcast snapshot sent"),
                Err(_) => trace!("No WebSocket receivers connected"),
            },
            Err(e) => {
                debug!(error = %e, "Failed to serialize dashboard snapshot");
            }
        }
    }
}
