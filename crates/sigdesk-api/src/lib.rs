//! REST client for the signal backend.
//!
//! Used at startup (and on demand) to hydrate the live store with snapshot
//! data the socket only pushes on change: the current regime, the
//! gainers/losers lists and funding rates.

pub mod client;
pub mod error;
pub mod hydrate;

pub use client::{ApiClient, RegimeHealth};
pub use error::{ApiError, ApiResult};
pub use hydrate::{hydrate_store, HydrationReport};
