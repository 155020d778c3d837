//! Shared test helpers: message builders and mock collaborators.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::sync::{Semaphore, mpsc, oneshot};

use depthsync::models::book::{DepthDiff, DepthSnapshot, PriceLevel};
use depthsync::sync::{SnapshotFetcher, StreamSource, Subscription};
use depthsync::{DepthsyncError, Result};

pub fn level(price: &str, qty: &str) -> PriceLevel {
    PriceLevel::new(
        Decimal::from_str(price).unwrap(),
        Decimal::from_str(qty).unwrap(),
    )
}

/// Builds a diff covering `first..=last` with one distinguishing bid level.
pub fn diff(first: u64, last: u64) -> DepthDiff {
    DepthDiff {
        event_time: 1_700_000_000_000 + last,
        symbol: "BTCUSDT".to_string(),
        first_update_id: first,
        last_update_id: last,
        bids: vec![level(&format!("{}.00", 40_000 + last), "1.0")],
        asks: vec![],
    }
}

pub fn diff_with_levels(
    first: u64,
    last: u64,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
) -> DepthDiff {
    DepthDiff {
        event_time: 1_700_000_000_000 + last,
        symbol: "BTCUSDT".to_string(),
        first_update_id: first,
        last_update_id: last,
        bids,
        asks,
    }
}

pub fn snapshot(version: u64) -> DepthSnapshot {
    DepthSnapshot {
        last_update_id: version,
        bids: vec![level("50000.00", "1.0")],
        asks: vec![level("50001.00", "1.0")],
    }
}

pub fn snapshot_with_levels(
    version: u64,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
) -> DepthSnapshot {
    DepthSnapshot {
        last_update_id: version,
        bids,
        asks,
    }
}

/// Combined-stream diff frame for `btcusdt@depth`.
pub fn diff_frame(first: u64, last: u64) -> Value {
    json!({
        "stream": "btcusdt@depth",
        "data": {
            "e": "depthUpdate",
            "E": 1_700_000_000_000u64 + last,
            "s": "BTCUSDT",
            "U": first,
            "u": last,
            "b": [[format!("{}.00", 40_000 + last), "1.0"]],
            "a": []
        }
    })
}

/// Combined-stream top-N frame.
pub fn topn_frame(stream: &str, version: u64) -> Value {
    json!({
        "stream": stream,
        "data": {
            "lastUpdateId": version,
            "bids": [["50000.00", "1.0"]],
            "asks": [["50001.00", "1.0"]]
        }
    })
}

/// [`StreamSource`] handing out a pre-built channel the test pushes into.
pub struct MockSource {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
    pub unsubscribed: std::sync::Arc<AtomicBool>,
}

impl MockSource {
    /// Returns the source plus the sender the test feeds frames through.
    pub fn new() -> (std::sync::Arc<Self>, mpsc::UnboundedSender<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = std::sync::Arc::new(Self {
            rx: Mutex::new(Some(rx)),
            unsubscribed: std::sync::Arc::new(AtomicBool::new(false)),
        });
        (source, tx)
    }
}

#[async_trait]
impl StreamSource for MockSource {
    async fn subscribe(&self, _streams: &[String]) -> Result<Subscription> {
        let frames = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| DepthsyncError::Subscription("already subscribed".to_string()))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        // Record the unsubscribe so tests can assert it happened.
        let flag = std::sync::Arc::clone(&self.unsubscribed);
        tokio::spawn(async move {
            if stop_rx.await.is_ok() {
                flag.store(true, Ordering::SeqCst);
            }
        });

        Ok(Subscription {
            frames,
            stop: Some(stop_tx),
        })
    }
}

/// A [`StreamSource`] that always fails to subscribe.
pub struct FailingSource;

#[async_trait]
impl StreamSource for FailingSource {
    async fn subscribe(&self, _streams: &[String]) -> Result<Subscription> {
        Err(DepthsyncError::Subscription("connection refused".to_string()))
    }
}

/// [`SnapshotFetcher`] replaying a scripted queue of snapshots.
///
/// A gated fetcher blocks each call until the test calls [`release`], so
/// tests can control exactly when the "network" responds.
pub struct MockFetcher {
    responses: Mutex<VecDeque<DepthSnapshot>>,
    gate: Option<Semaphore>,
    pub calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new(responses: Vec<DepthSnapshot>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn gated(responses: Vec<DepthSnapshot>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            gate: Some(Semaphore::new(0)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Lets one gated fetch proceed.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl SnapshotFetcher for MockFetcher {
    async fn fetch_snapshot(&self, _instrument: &str, _depth: Option<u16>) -> Result<DepthSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| DepthsyncError::Snapshot("gate closed".to_string()))?;
            permit.forget();
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| DepthsyncError::Snapshot("no scripted response".to_string()))
    }
}

/// Polls `predicate` until it holds or two seconds pass.
pub async fn wait_for(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
