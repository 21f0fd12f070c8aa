//! Store hydration from REST snapshots.

use crate::client::ApiClient;
use crate::error::ApiResult;
use serde_json::Value;
use sigdesk_feed::{InboundPayload, IngestionAdapter};
use tracing::{info, warn};

/// Outcome of a hydration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    /// Regime service health; `None` when the check itself failed.
    pub healthy: Option<bool>,
    pub fetched: Vec<String>,
    pub failed: Vec<String>,
}

impl HydrationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Feed a fetched body through the adapter as a snapshot update.
    async fn record(
        &mut self,
        adapter: &IngestionAdapter,
        path: &str,
        kind: &str,
        result: ApiResult<Value>,
    ) {
        match result {
            Ok(body) => {
                adapter
                    .ingest_snapshot(InboundPayload::from_event(kind, body))
                    .await;
                self.fetched.push(path.to_string());
            }
            Err(e) => {
                warn!(path, error = %e, "Snapshot hydration failed");
                self.failed.push(path.to_string());
            }
        }
    }
}

/// Check regime health, then fetch every snapshot source and feed it through
/// the adapter.
///
/// Snapshot updates never override data the socket has already delivered.
/// Failures are logged and reported; live socket data still flows.
pub async fn hydrate_store(client: &ApiClient, adapter: &IngestionAdapter) -> HydrationReport {
    let mut report = HydrationReport::default();

    match client.fetch_regime_health().await {
        Ok(health) => {
            let healthy = health.is_healthy();
            if !healthy {
                warn!(status = ?health.status, "Regime service unhealthy, context may be outdated");
            }
            report.healthy = Some(healthy);
        }
        Err(e) => warn!(error = %e, "Regime health check failed"),
    }

    let result = client.fetch_regime_context().await;
    report.record(adapter, "/regime/context", "regime", result).await;

    let result = client.fetch_top_movers(true).await;
    report.record(adapter, "/top/gainers", "top:gainers", result).await;

    let result = client.fetch_top_movers(false).await;
    report.record(adapter, "/top/losers", "top:losers", result).await;

    let result = client.fetch_funding().await;
    report.record(adapter, "/funding", "funding", result).await;

    info!(
        healthy = ?report.healthy,
        fetched = report.fetched.len(),
        failed = report.failed.len(),
        "Store hydration finished"
    );
    report
}
