//! Order book synchronization.
//!
//! This module is organized by concern:
//! - [`engine`] - the pure synchronization state machine
//! - [`tracker`] - the async driver and collaborator traits

pub mod engine;
pub mod tracker;

pub use engine::{DiffOutcome, SnapshotOutcome, SyncEngine, TopNOutcome};
pub use tracker::{BookUpdate, OrderBookTracker, SnapshotFetcher, StreamSource, Subscription};
