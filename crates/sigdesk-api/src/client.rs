//! HTTP client for the signal backend REST API.

use crate::error::{ApiError, ApiResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// `GET /regime/health` response.
///
/// Upstream shape is loose; the known fields are pulled out and the rest kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeHealth {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub healthy: Option<bool>,
    #[serde(default)]
    pub last_update: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegimeHealth {
    /// Explicit `healthy` wins; otherwise judged from `status`.
    pub fn is_healthy(&self) -> bool {
        if let Some(healthy) = self.healthy {
            return healthy;
        }
        matches!(
            self.status.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("ok" | "healthy" | "up")
        )
    }
}

/// Client for the signal backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - API origin, e.g. `https://signals.example.com/api`
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidBaseUrl(base_url));
        }

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ApiError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET a path and return the JSON body untyped.
    pub async fn get_json(&self, path: &str) -> ApiResult<Value> {
        let url = self.url(path);
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::HttpClient(format!("Failed to parse response: {e}")))
    }

    pub async fn fetch_regime_health(&self) -> ApiResult<RegimeHealth> {
        let body = self.get_json("/regime/health").await?;
        let health: RegimeHealth = serde_json::from_value(body)?;
        info!(
            status = ?health.status,
            healthy = health.is_healthy(),
            "Regime health fetched"
        );
        Ok(health)
    }

    /// Raw regime context; normalized by the ingestion adapter like a `regime` push.
    pub async fn fetch_regime_context(&self) -> ApiResult<Value> {
        self.get_json("/regime/context").await
    }

    /// Gainers (`gainers = true`) or losers list, raw.
    pub async fn fetch_top_movers(&self, gainers: bool) -> ApiResult<Value> {
        let path = if gainers { "/top/gainers" } else { "/top/losers" };
        self.get_json(path).await
    }

    pub async fn fetch_funding(&self) -> ApiResult<Value> {
        self.get_json("/funding").await
    }
}
