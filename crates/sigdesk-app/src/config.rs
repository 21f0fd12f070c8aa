//! Application configuration.
//!
//! Layering, lowest to highest precedence:
//! 1. `serde` defaults
//! 2. TOML file (optional)
//! 3. `SIGDESK__SECTION__KEY` environment variables
//! 4. Deployment variables shared with the web frontend
//!    (`NEXT_PUBLIC_SOCKET_URL`, `NEXT_PUBLIC_API_BASE_URL`, ...)

use crate::error::{AppError, AppResult};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use sigdesk_dashboard::DashboardConfig;
use sigdesk_feed::StoreConfig;
use sigdesk_ws::{ConnectionConfig, Transport};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Socket URL used outside production when nothing else is configured.
pub const DEVELOPMENT_SOCKET_URL: &str = "http://localhost:3001";

/// Socket.IO connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Server URL. Empty means "pick the default for this environment".
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_transports")]
    pub transports: Vec<Transport>,
    /// 0 = retry forever.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

fn default_path() -> String {
    "/socket.io".to_string()
}

fn default_namespace() -> String {
    "/".to_string()
}

fn default_transports() -> Vec<Transport> {
    vec![Transport::Websocket, Transport::Polling]
}

fn default_max_reconnect_attempts() -> u32 {
    15
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_ping_interval_ms() -> u64 {
    30000
}

fn default_ping_timeout_ms() -> u64 {
    20000
}

fn default_connection_timeout_ms() -> u64 {
    10000
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            path: default_path(),
            namespace: default_namespace(),
            transports: default_transports(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

impl From<WebSocketConfig> for ConnectionConfig {
    fn from(cfg: WebSocketConfig) -> Self {
        Self {
            url: cfg.url,
            path: cfg.path,
            namespace: cfg.namespace,
            transports: cfg.transports,
            max_reconnect_attempts: cfg.max_reconnect_attempts,
            reconnect_delay_ms: cfg.reconnect_delay_ms,
            ping_interval_ms: cfg.ping_interval_ms,
            ping_timeout_ms: cfg.ping_timeout_ms,
            connection_timeout_ms: cfg.connection_timeout_ms,
        }
    }
}

/// REST snapshot settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// REST base URL. Hydration is skipped when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_hydrate_on_start")]
    pub hydrate_on_start: bool,
}

fn default_hydrate_on_start() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            hydrate_on_start: default_hydrate_on_start(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Capacity of the socket-event and store-update channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            websocket: WebSocketConfig::default(),
            api: ApiConfig::default(),
            store: StoreConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path` and the process environment.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::load_with_env(path, &vars)
    }

    /// Load from `path` with an explicit environment map.
    ///
    /// A missing file is not an error; defaults and the environment still apply.
    pub fn load_with_env(path: impl AsRef<Path>, vars: &HashMap<String, String>) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
        }

        let layered: HashMap<String, String> = vars
            .iter()
            .filter(|(k, _)| k.starts_with("SIGDESK__"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut config: Self = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("SIGDESK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(layered)),
            )
            .build()?
            .try_deserialize()?;

        config.apply_env_overrides(|key| vars.get(key).cloned());
        config.resolve_socket_url(|key| vars.get(key).cloned())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the deployment variables shared with the web frontend.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("NEXT_PUBLIC_SOCKET_URL") {
            debug!(url = %url, "Socket URL from NEXT_PUBLIC_SOCKET_URL");
            self.websocket.url = url;
        }

        if let Some(base) = lookup("NEXT_PUBLIC_API_BASE_URL").or_else(|| lookup("NEXT_PUBLIC_API_BASE")) {
            debug!(base = %base, "API base from environment");
            self.api.base_url = Some(base);
        } else if self.api.base_url.is_none() {
            if let Some(origin) = fallback_origin(&lookup) {
                self.api.base_url = Some(format!("{}/api", origin.trim_end_matches('/')));
            }
        }
    }

    /// Fill an empty socket URL with the default for the current environment.
    ///
    /// Production has no built-in host: the app origin (`APP_URL`/`BASE_URL`)
    /// is used, and with neither set the configuration is rejected.
    pub fn resolve_socket_url<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !self.websocket.url.trim().is_empty() {
            return Ok(());
        }

        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let production = lookup("NODE_ENV").is_some_and(|v| v == "production");

        self.websocket.url = if production {
            fallback_origin(&lookup).ok_or_else(|| {
                AppError::Config(
                    "no socket URL for production: set websocket.url, NEXT_PUBLIC_SOCKET_URL or APP_URL"
                        .to_string(),
                )
            })?
        } else {
            DEVELOPMENT_SOCKET_URL.to_string()
        };
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        let url = &self.websocket.url;
        if !["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| url.starts_with(scheme))
        {
            return Err(AppError::Config(format!("unsupported socket URL: {url}")));
        }
        if self.websocket.transports.is_empty() {
            return Err(AppError::Config("websocket.transports is empty".to_string()));
        }
        if self.store.capacity == 0 {
            return Err(AppError::Config("store.capacity must be > 0".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(AppError::Config("channel_capacity must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        self.websocket.clone().into()
    }
}

fn fallback_origin<F>(lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup("APP_URL").or_else(|| lookup("BASE_URL"))
}
