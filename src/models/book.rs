//! Depth stream and snapshot models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price level in the order book.
///
/// On the wire a level is a two-element array of decimal strings
/// (`["50000.00", "1.25"]`); a quantity of zero means "remove this level."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Decimal, Decimal)")]
pub struct PriceLevel {
    pub price: Decimal,
    pub qty: Decimal,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Decimal, qty: Decimal) -> Self {
        Self { price, qty }
    }
}

impl From<(Decimal, Decimal)> for PriceLevel {
    fn from((price, qty): (Decimal, Decimal)) -> Self {
        Self { price, qty }
    }
}

/// An incremental depth update covering the contiguous id range
/// `first_update_id..=last_update_id`.
///
/// A diff is a single logical unit: it is applied atomically or not at all.
#[derive(Debug, Clone, Deserialize)]
pub struct DepthDiff {
    /// Event time in exchange epoch milliseconds.
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub last_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<PriceLevel>,
    #[serde(rename = "a")]
    pub asks: Vec<PriceLevel>,
}

/// A full point-in-time view of the book, tagged with the id of the last
/// update it reflects.
///
/// This is both the REST snapshot response and the shape of a top-N partial
/// book stream frame.
#[derive(Debug, Clone, Deserialize)]
pub struct DepthSnapshot {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}
