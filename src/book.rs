//! In-memory order book state and merge primitives.
//!
//! [`OrderBook`] is a pure data structure: two price-ordered sides plus the
//! id of the last applied update. It has no network or timing awareness;
//! the synchronizer in [`crate::sync`] decides *when* these operations run.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::book::PriceLevel;

/// Lifecycle status of a tracked book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BookStatus {
    Disconnected,
    Connecting,
    Syncing,
    Synced,
    Resyncing,
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Which side of the book a [`OrderBookSide`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

/// One price-ordered side of the book.
///
/// Prices are unique keys; quantities are always positive — a zero-quantity
/// change removes the level instead of storing it. Iteration is best-first:
/// descending for bids, ascending for asks.
#[derive(Debug, Clone)]
pub struct OrderBookSide {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl OrderBookSide {
    #[must_use]
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Applies a single level change: zero quantity removes, anything else
    /// inserts or overwrites.
    pub fn apply(&mut self, level: &PriceLevel) {
        if level.qty.is_zero() {
            self.levels.remove(&level.price);
        } else {
            self.levels.insert(level.price, level.qty);
        }
    }

    /// Replaces the side wholesale with the given levels.
    pub fn replace(&mut self, levels: &[PriceLevel]) {
        self.levels.clear();
        for level in levels {
            self.apply(level);
        }
    }

    /// Returns the best level (highest bid, lowest ask).
    #[must_use]
    pub fn best(&self) -> Option<PriceLevel> {
        let entry = match self.side {
            Side::Bid => self.levels.last_key_value(),
            Side::Ask => self.levels.first_key_value(),
        };
        entry.map(|(price, qty)| PriceLevel::new(*price, *qty))
    }

    /// Returns up to `n` levels in priority order, or all levels if `n`
    /// is `None`.
    #[must_use]
    pub fn levels(&self, n: Option<usize>) -> Vec<PriceLevel> {
        let take = n.unwrap_or(usize::MAX);
        match self.side {
            Side::Bid => self
                .levels
                .iter()
                .rev()
                .take(take)
                .map(|(p, q)| PriceLevel::new(*p, *q))
                .collect(),
            Side::Ask => self
                .levels
                .iter()
                .take(take)
                .map(|(p, q)| PriceLevel::new(*p, *q))
                .collect(),
        }
    }

    /// Discards everything beyond the best `n` levels.
    pub fn truncate(&mut self, n: usize) {
        while self.levels.len() > n {
            match self.side {
                Side::Bid => self.levels.pop_first(),
                Side::Ask => self.levels.pop_last(),
            };
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }
}

/// The authoritative in-memory book for one instrument.
#[derive(Debug, Clone)]
pub struct OrderBook {
    bids: OrderBookSide,
    asks: OrderBookSide,
    version: u64,
    depth_limit: Option<u16>,
}

impl OrderBook {
    /// Creates an empty book. A depth limit switches on top-N mode: every
    /// mutation truncates each side to the best `n` levels.
    #[must_use]
    pub fn new(depth_limit: Option<u16>) -> Self {
        Self {
            bids: OrderBookSide::new(Side::Bid),
            asks: OrderBookSide::new(Side::Ask),
            version: 0,
            depth_limit,
        }
    }

    /// Id of the last applied update (or snapshot if none applied yet).
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn depth_limit(&self) -> Option<u16> {
        self.depth_limit
    }

    /// Replaces both sides wholesale and adopts the snapshot's version.
    pub fn apply_snapshot(&mut self, version: u64, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.bids.replace(bids);
        self.asks.replace(asks);
        self.version = version;
        self.enforce_depth_limit();
    }

    /// Merges a diff's level changes into both sides and advances the
    /// version to `last_update_id`.
    ///
    /// Continuity and staleness checks belong to the synchronizer; this
    /// method applies unconditionally.
    pub fn apply_diff(
        &mut self,
        last_update_id: u64,
        bid_changes: &[PriceLevel],
        ask_changes: &[PriceLevel],
    ) {
        for level in bid_changes {
            self.bids.apply(level);
        }
        for level in ask_changes {
            self.asks.apply(level);
        }
        self.version = last_update_id;
        self.enforce_depth_limit();
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.best()
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.best()
    }

    /// Returns the first `n` levels per side in priority order.
    #[must_use]
    pub fn depth(&self, n: usize) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        (self.bids.levels(Some(n)), self.asks.levels(Some(n)))
    }

    #[must_use]
    pub fn bids(&self) -> &OrderBookSide {
        &self.bids
    }

    #[must_use]
    pub fn asks(&self) -> &OrderBookSide {
        &self.asks
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.version = 0;
    }

    fn enforce_depth_limit(&mut self) {
        if let Some(limit) = self.depth_limit {
            self.bids.truncate(limit as usize);
            self.asks.truncate(limit as usize);
        }
    }

    /// Builds an immutable reader snapshot of the book.
    #[must_use]
    pub fn view(&self, status: BookStatus) -> BookView {
        BookView {
            status,
            version: self.version,
            bids: self.bids.levels(None),
            asks: self.asks.levels(None),
        }
    }
}

/// A point-in-time, fully applied view of the book.
///
/// Readers only ever see views taken between whole update applications,
/// never a half-applied diff. Price levels are meaningful only while
/// `status` is [`BookStatus::Synced`].
#[derive(Debug, Clone, Serialize)]
pub struct BookView {
    pub status: BookStatus,
    pub version: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl BookView {
    /// An empty, disconnected view used before the first synchronization.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            status: BookStatus::Disconnected,
            version: 0,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }
}
