//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] sigdesk_ws::WsError),

    #[error("API error: {0}")]
    Api(#[from] sigdesk_api::ApiError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sigdesk_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
