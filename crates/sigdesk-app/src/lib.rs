//! sigdesk - live trading-signal desk.
//!
//! Wires the components together:
//! - Socket.IO connection to the signal backend
//! - Ingestion adapter and bounded live store
//! - Optional REST hydration at startup
//! - Optional dashboard API over the store

pub mod app;
pub mod config;
pub mod error;

pub use app::{AppContext, Application};
pub use config::{ApiConfig, AppConfig, WebSocketConfig};
pub use error::{AppError, AppResult};
