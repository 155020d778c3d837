//! Order book synchronization engine for incremental market data streams.
//!
//! Maintains a locally consistent order book from two independently failing
//! upstream channels: a pollable depth snapshot endpoint and a continuous
//! incremental-diff stream. Inbound frames are classified by shape before
//! routing, diffs are buffered while a snapshot is in flight, sequence gaps
//! trigger automatic resynchronization, and depth-limited books are kept
//! fresh by wholesale replacement.

pub mod book;
pub mod classify;
pub mod config;
pub mod error;
pub mod models;
pub mod sync;
pub mod transport;

pub use book::{BookStatus, BookView, OrderBook};
pub use config::TrackerConfig;
pub use error::{DepthsyncError, Result};
pub use sync::{BookUpdate, OrderBookTracker, SnapshotFetcher, StreamSource, Subscription};
