//! Signal ingestion and live storage for sigdesk.
//!
//! Normalizes loosely shaped socket/REST payloads into typed `SignalUpdate`
//! messages and applies them to bounded, newest-first buffers owned by a
//! single consumer task. Readers get consistent `Arc` snapshots.

pub mod adapter;
pub mod error;
pub mod extract;
pub mod store;

pub use adapter::{
    run_event_pump, EventKind, InboundPayload, IngestStats, IngestionAdapter, SignalUpdate,
};
pub use error::{FeedError, FeedResult};
pub use store::{
    run_store_consumer, GatedSnapshot, LiveSignalStore, SignalList, StoreConfig, StoreReader,
    StoreSummary, StoreView, StoreWriter,
};
