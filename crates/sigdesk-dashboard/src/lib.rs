//! sigdesk-dashboard - read-only API over the live signal store.
//!
//! - REST endpoints for snapshots, single buffers (raw or regime-filtered)
//!   and ad-hoc gate checks
//! - Prometheus text exposition
//! - WebSocket pushing a fresh snapshot whenever the store changes
//!
//! # Usage
//!
//! ```ignore
//! use sigdesk_dashboard::{run_server, DashboardConfig, DashboardState};
//!
//! let state = DashboardState::new(store_reader.clone());
//! tokio::spawn(run_server(state, DashboardConfig::default(), shutdown_token.clone()));
//! ```

mod broadcast;
mod config;
mod server;
mod state;
mod types;

pub use config::DashboardConfig;
pub use server::{create_router, run_server, AppState, DashboardError};
pub use state::DashboardState;
pub use types::{DashboardMessage, DashboardSnapshot, GateCheck, SignalsView};
