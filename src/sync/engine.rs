//! Synchronization state machine.
//!
//! [`SyncEngine`] is the pure core of the synchronizer: it owns the
//! [`OrderBook`], tracks the lifecycle status, buffers diffs while a
//! snapshot is outstanding, and decides for every inbound message whether
//! it is applied, buffered, ignored, or evidence of a gap. It performs no
//! I/O and never suspends; the async driver in
//! [`tracker`](crate::sync::tracker) feeds it.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::book::{BookStatus, BookView, OrderBook};
use crate::models::book::{DepthDiff, DepthSnapshot};

/// What the engine did with an incremental diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    /// Held back while a snapshot fetch is outstanding.
    Buffered,
    /// Merged into the book; the new version is live.
    Applied { version: u64, event_time: u64 },
    /// Retransmission already covered by the current version; ignored.
    Stale,
    /// Sequence continuity broke; the engine entered `Resyncing` and the
    /// diff was buffered for replay after the next snapshot.
    Gap,
    /// Arrived before the stream subscription was acknowledged; dropped.
    Dropped,
}

/// What the engine did with a fetched snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Installed, buffered diffs replayed; the book is `Synced`.
    Installed { version: u64, replayed: usize },
    /// The snapshot cannot be joined to the buffered stream; fetch again.
    TooStale,
    /// The engine was not waiting for a snapshot; nothing happened.
    Ignored,
}

/// What the engine did with a top-N stream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopNOutcome {
    /// Replaced the book wholesale; the new version is live.
    Installed { version: u64 },
    /// Out-of-order or duplicate retransmission; ignored.
    Ignored,
}

/// Pure synchronization state machine for one instrument.
#[derive(Debug)]
pub struct SyncEngine {
    instrument: String,
    book: OrderBook,
    status: BookStatus,
    buffer: VecDeque<DepthDiff>,
    max_buffered: usize,
    /// Set after a snapshot installs with nothing to replay: the next live
    /// diff is validated with the straddle check instead of strict
    /// continuity.
    straddle_next: bool,
}

impl SyncEngine {
    #[must_use]
    pub fn new(instrument: impl Into<String>, depth_limit: Option<u16>, max_buffered: usize) -> Self {
        Self {
            instrument: instrument.into(),
            book: OrderBook::new(depth_limit),
            status: BookStatus::Disconnected,
            buffer: VecDeque::new(),
            max_buffered,
            straddle_next: false,
        }
    }

    #[must_use]
    pub fn status(&self) -> BookStatus {
        self.status
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.book.version()
    }

    #[must_use]
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Immutable reader snapshot carrying the current status.
    #[must_use]
    pub fn view(&self) -> BookView {
        self.book.view(self.status)
    }

    /// A subscribe was requested; the stream is being dialed.
    pub fn subscribe_requested(&mut self) {
        if self.status == BookStatus::Disconnected {
            self.status = BookStatus::Connecting;
            debug!(instrument = %self.instrument, "Connecting");
        }
    }

    /// The stream subscription was acknowledged; diffs buffer from here on.
    pub fn stream_acknowledged(&mut self) {
        if self.status == BookStatus::Connecting {
            self.status = BookStatus::Syncing;
            info!(instrument = %self.instrument, "Stream acknowledged, syncing");
        }
    }

    /// The stream dropped; everything buffered is void.
    pub fn on_disconnect(&mut self) {
        self.status = BookStatus::Disconnected;
        self.buffer.clear();
        self.straddle_next = false;
        info!(instrument = %self.instrument, "Disconnected");
    }

    /// Feeds one incremental diff to the state machine (full-depth mode).
    pub fn on_diff(&mut self, diff: DepthDiff) -> DiffOutcome {
        match self.status {
            BookStatus::Disconnected | BookStatus::Connecting => DiffOutcome::Dropped,
            BookStatus::Syncing | BookStatus::Resyncing => {
                self.push_buffered(diff);
                DiffOutcome::Buffered
            }
            BookStatus::Synced => self.on_live_diff(diff),
        }
    }

    fn on_live_diff(&mut self, diff: DepthDiff) -> DiffOutcome {
        let version = self.book.version();

        // Reordered duplicates can arrive right after a resync; the id range
        // tells us the book already covers them.
        if diff.last_update_id <= version {
            debug!(
                instrument = %self.instrument,
                last_update_id = diff.last_update_id,
                version,
                "Ignoring stale diff"
            );
            return DiffOutcome::Stale;
        }

        let contiguous = if self.straddle_next {
            diff.first_update_id <= version + 1 && version + 1 <= diff.last_update_id
        } else {
            diff.first_update_id == version + 1
        };

        if !contiguous {
            warn!(
                instrument = %self.instrument,
                expected = version + 1,
                first_update_id = diff.first_update_id,
                last_update_id = diff.last_update_id,
                "Sequence gap detected, resyncing"
            );
            self.status = BookStatus::Resyncing;
            self.push_buffered(diff);
            return DiffOutcome::Gap;
        }

        self.straddle_next = false;
        let event_time = diff.event_time;
        self.book
            .apply_diff(diff.last_update_id, &diff.bids, &diff.asks);
        DiffOutcome::Applied {
            version: diff.last_update_id,
            event_time,
        }
    }

    /// Installs a fetched snapshot and replays the buffered diffs
    /// (full-depth mode).
    ///
    /// Buffered diffs entirely covered by the snapshot are discarded. The
    /// first remaining diff must straddle `version + 1`; replay then
    /// continues under the strict continuity check. Any break means
    /// messages were lost between snapshot and buffer, so the caller must
    /// fetch a fresher snapshot. The install plus replay commits as one
    /// unit — on failure the previous book is untouched.
    pub fn on_snapshot(&mut self, snapshot: &DepthSnapshot) -> SnapshotOutcome {
        if !matches!(self.status, BookStatus::Syncing | BookStatus::Resyncing) {
            debug!(instrument = %self.instrument, status = %self.status, "Snapshot ignored");
            return SnapshotOutcome::Ignored;
        }

        let version = snapshot.last_update_id;
        let before = self.buffer.len();
        self.buffer.retain(|d| d.last_update_id > version);
        let discarded = before - self.buffer.len();

        let mut staged = self.book.clone();
        staged.apply_snapshot(version, &snapshot.bids, &snapshot.asks);

        if self.buffer.is_empty() {
            // Snapshot ran ahead of the buffered stream: adopt it and let
            // the straddle check place the next live diff.
            self.book = staged;
            self.status = BookStatus::Synced;
            self.straddle_next = true;
            info!(
                instrument = %self.instrument,
                version,
                discarded,
                "Snapshot installed, nothing to replay"
            );
            return SnapshotOutcome::Installed {
                version,
                replayed: 0,
            };
        }

        let mut pending: Vec<DepthDiff> = self.buffer.drain(..).collect();
        pending.sort_by_key(|d| d.first_update_id);

        let first = &pending[0];
        if !(first.first_update_id <= version + 1 && version + 1 <= first.last_update_id) {
            // Every buffered diff starts beyond the snapshot: the snapshot
            // is too old relative to the stream.
            warn!(
                instrument = %self.instrument,
                version,
                first_update_id = first.first_update_id,
                "Snapshot too stale for buffered stream, refetching"
            );
            self.buffer = pending.into();
            return SnapshotOutcome::TooStale;
        }

        let mut replayed = 0usize;
        for i in 0..pending.len() {
            let diff = &pending[i];
            if diff.last_update_id <= staged.version() {
                continue;
            }
            if replayed > 0 && diff.first_update_id != staged.version() + 1 {
                warn!(
                    instrument = %self.instrument,
                    expected = staged.version() + 1,
                    first_update_id = diff.first_update_id,
                    "Continuity break while replaying buffer, refetching"
                );
                self.buffer = pending.into();
                return SnapshotOutcome::TooStale;
            }
            staged.apply_diff(diff.last_update_id, &diff.bids, &diff.asks);
            replayed += 1;
        }

        let version = staged.version();
        self.book = staged;
        self.status = BookStatus::Synced;
        self.straddle_next = false;
        info!(
            instrument = %self.instrument,
            version,
            replayed,
            discarded,
            "Snapshot installed and buffer replayed"
        );
        SnapshotOutcome::Installed { version, replayed }
    }

    /// Feeds one top-N stream frame (depth-limited mode).
    ///
    /// Each frame is self-contained, so there is no buffering and no gap
    /// detection; a lost frame heals on the next one. Frames whose version
    /// does not advance are reordered retransmissions and are ignored.
    pub fn on_topn_snapshot(&mut self, snapshot: &DepthSnapshot) -> TopNOutcome {
        match self.status {
            BookStatus::Disconnected | BookStatus::Connecting => return TopNOutcome::Ignored,
            _ => {}
        }

        let version = snapshot.last_update_id;
        if self.book.version() != 0 && version <= self.book.version() {
            debug!(
                instrument = %self.instrument,
                version,
                current = self.book.version(),
                "Ignoring out-of-order top-N frame"
            );
            return TopNOutcome::Ignored;
        }

        self.book
            .apply_snapshot(version, &snapshot.bids, &snapshot.asks);
        if self.status != BookStatus::Synced {
            info!(instrument = %self.instrument, version, "Top-N book synced");
            self.status = BookStatus::Synced;
        }
        TopNOutcome::Installed { version }
    }

    fn push_buffered(&mut self, diff: DepthDiff) {
        if self.buffer.len() == self.max_buffered {
            // The next snapshot will cover whatever we evict.
            self.buffer.pop_front();
        }
        self.buffer.push_back(diff);
    }
}
