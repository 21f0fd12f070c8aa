//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Missing type discriminator")]
    MissingType,

    #[error("Malformed {kind} payload: {detail}")]
    Malformed { kind: String, detail: String },

    #[error("Store channel closed")]
    ChannelClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FeedError {
    pub fn malformed(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Malformed {
            kind: kind.into(),
            detail: detail.into(),
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
