//! Error types for sigdesk-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown regime: {0}")]
    UnknownRegime(String),

    #[error("Unknown signal category: {0}")]
    UnknownCategory(String),

    #[error("Invalid side: {0}")]
    InvalidSide(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
