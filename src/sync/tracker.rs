//! Async order book tracker.
//!
//! [`OrderBookTracker`] drives one [`SyncEngine`] per instrument: it
//! subscribes through a [`StreamSource`], races the snapshot fetch against
//! frame buffering, and keeps the book consistent across gaps and
//! disconnects. Readers take [`BookView`] snapshots; observers register
//! callbacks fired once per applied update, in application order.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::book::BookView;
use crate::classify::Classifier;
use crate::config::TrackerConfig;
use crate::error::{DepthsyncError, Result};
use crate::models::book::{DepthDiff, DepthSnapshot};
use crate::models::frame_payload;
use crate::sync::engine::{DiffOutcome, SnapshotOutcome, SyncEngine, TopNOutcome};

/// An acknowledged stream subscription.
///
/// Frames arrive on `frames` in delivery order; sending on `stop` (or
/// dropping it) tells the source to unsubscribe and close.
pub struct Subscription {
    pub frames: mpsc::UnboundedReceiver<Value>,
    pub stop: Option<oneshot::Sender<()>>,
}

/// Delivers raw decoded frames for a set of stream names.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Subscribes to the given streams, returning a handle once the
    /// subscription is acknowledged.
    async fn subscribe(&self, streams: &[String]) -> Result<Subscription>;
}

/// Fetches a full depth snapshot for one instrument.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch_snapshot(&self, instrument: &str, depth: Option<u16>) -> Result<DepthSnapshot>;
}

/// Notification carried to update observers.
///
/// `event_time` is present for incremental diffs; snapshot installs carry
/// none (the snapshot endpoint is not timestamped).
#[derive(Debug, Clone, Copy)]
pub struct BookUpdate {
    pub version: u64,
    pub event_time: Option<u64>,
}

type UpdateCallback = Arc<dyn Fn(BookUpdate) + Send + Sync>;

/// State shared between the tracker handle and its processing loop.
struct TrackerShared {
    view: RwLock<BookView>,
    callbacks: Mutex<Vec<UpdateCallback>>,
}

impl TrackerShared {
    fn publish(&self, engine: &SyncEngine) {
        let mut guard = self
            .view
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = engine.view();
    }

    fn notify(&self, update: BookUpdate) {
        // Invoke outside the lock so a callback may itself register further
        // observers. Delivery stays in-order and non-concurrent: only the
        // single writer calls this.
        let callbacks: Vec<UpdateCallback> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in &callbacks {
            callback(update);
        }
    }
}

/// Maintains a consistent order book for one instrument.
///
/// One tracker owns exactly one book; run several trackers for several
/// instruments. All mutation happens on a single logical writer (the
/// `start` call and the processing loop it spawns), so readers never
/// observe a partially applied diff.
pub struct OrderBookTracker<S, F> {
    config: TrackerConfig,
    source: Arc<S>,
    fetcher: Arc<F>,
    classifier: Classifier,
    shared: Arc<TrackerShared>,
    shutdown: watch::Sender<bool>,
}

impl<S, F> OrderBookTracker<S, F>
where
    S: StreamSource,
    F: SnapshotFetcher + 'static,
{
    #[must_use]
    pub fn new(config: TrackerConfig, source: Arc<S>, fetcher: Arc<F>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            source,
            fetcher,
            classifier: Classifier::with_default_rules(),
            shared: Arc::new(TrackerShared {
                view: RwLock::new(BookView::empty()),
                callbacks: Mutex::new(Vec::new()),
            }),
            shutdown,
        }
    }

    /// Registers an observer fired once per applied diff or installed
    /// snapshot, in application order, never concurrently.
    pub fn on_update(&self, callback: impl Fn(BookUpdate) + Send + Sync + 'static) {
        self.shared
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Point-in-time snapshot of the book.
    ///
    /// Price levels are meaningful only while the view's status is
    /// [`BookStatus::Synced`](crate::book::BookStatus::Synced).
    #[must_use]
    pub fn current_state(&self) -> BookView {
        self.shared
            .view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Signals the processing loop (or an in-flight `start`) to stop,
    /// unsubscribe, and transition to `Disconnected`.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Subscribes and synchronizes, returning once the book is `Synced`.
    ///
    /// On success a background processing loop keeps applying updates until
    /// [`stop`](Self::stop) is called or the stream disconnects. The book
    /// never reads `Synced` when this returns an error.
    ///
    /// # Errors
    ///
    /// - [`DepthsyncError::Subscription`] if the stream subscription fails
    /// - [`DepthsyncError::Snapshot`] / [`DepthsyncError::Http`] if the
    ///   snapshot fetch fails
    /// - [`DepthsyncError::SyncTimeout`] if synchronization misses the
    ///   configured deadline
    /// - [`DepthsyncError::Cancelled`] if [`stop`](Self::stop) was called
    /// - [`DepthsyncError::Disconnected`] if the stream closed mid-sync
    pub async fn start(&self) -> Result<()> {
        // A previous stop must not cancel this run.
        self.shutdown.send_replace(false);
        let mut shutdown_rx = self.shutdown.subscribe();

        let mut engine = SyncEngine::new(
            &self.config.instrument,
            self.config.depth_limit,
            self.config.max_buffered_diffs,
        );
        engine.subscribe_requested();
        self.shared.publish(&engine);

        let stream_name = self.config.stream_name();
        let mut subscription = self
            .source
            .subscribe(std::slice::from_ref(&stream_name))
            .await?;
        engine.stream_acknowledged();
        self.shared.publish(&engine);

        let result = if self.config.depth_limit.is_none() {
            sync_full_depth(
                &self.config,
                &self.classifier,
                self.fetcher.as_ref(),
                &mut subscription.frames,
                &mut engine,
                &mut shutdown_rx,
            )
            .await
        } else {
            sync_top_n(
                &self.config,
                &self.classifier,
                &mut subscription.frames,
                &mut engine,
                &mut shutdown_rx,
            )
            .await
        };

        match result {
            Ok(update) => {
                self.shared.publish(&engine);
                self.shared.notify(update);
                info!(
                    instrument = %self.config.instrument,
                    version = update.version,
                    "Order book synchronized"
                );

                tokio::spawn(run_loop(
                    self.config.clone(),
                    self.classifier.clone(),
                    Arc::clone(&self.fetcher),
                    subscription,
                    engine,
                    Arc::clone(&self.shared),
                    shutdown_rx,
                ));
                Ok(())
            }
            Err(e) => {
                self.shared.publish(&engine);
                if let Some(stop) = subscription.stop.take() {
                    let _ = stop.send(());
                }
                Err(e)
            }
        }
    }
}

/// Full-depth synchronization: buffer diffs while the snapshot fetch is in
/// flight, install, replay, refetch if the snapshot was too stale.
async fn sync_full_depth<F: SnapshotFetcher + ?Sized>(
    config: &TrackerConfig,
    classifier: &Classifier,
    fetcher: &F,
    frames: &mut mpsc::UnboundedReceiver<Value>,
    engine: &mut SyncEngine,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<BookUpdate> {
    let stream_name = config.stream_name();
    let deadline = Instant::now() + config.sync_timeout;

    loop {
        let mut fetch = Box::pin(fetcher.fetch_snapshot(&config.instrument, None));
        loop {
            tokio::select! {
                snapshot = &mut fetch => {
                    let snapshot = snapshot?;
                    match engine.on_snapshot(&snapshot) {
                        SnapshotOutcome::Installed { version, .. } => {
                            return Ok(BookUpdate { version, event_time: None });
                        }
                        SnapshotOutcome::TooStale => break,
                        SnapshotOutcome::Ignored => {
                            return Err(DepthsyncError::Snapshot(
                                "snapshot arrived in unexpected state".to_string(),
                            ));
                        }
                    }
                }
                frame = frames.recv() => {
                    match frame {
                        Some(frame) => buffer_frame(classifier, engine, &stream_name, &frame),
                        None => return Err(DepthsyncError::Disconnected),
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    return Err(DepthsyncError::SyncTimeout);
                }
                _ = shutdown.changed() => {
                    return Err(DepthsyncError::Cancelled);
                }
            }
        }
    }
}

/// Top-N synchronization: wait for the first full frame on the stream.
async fn sync_top_n(
    config: &TrackerConfig,
    classifier: &Classifier,
    frames: &mut mpsc::UnboundedReceiver<Value>,
    engine: &mut SyncEngine,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<BookUpdate> {
    let stream_name = config.stream_name();
    let deadline = Instant::now() + config.sync_timeout;

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    return Err(DepthsyncError::Disconnected);
                };
                if classifier.classify(&frame).as_deref() != Some(stream_name.as_str()) {
                    continue;
                }
                let Some(snapshot) = decode_payload::<DepthSnapshot>(&frame) else {
                    continue;
                };
                if let TopNOutcome::Installed { version } = engine.on_topn_snapshot(&snapshot) {
                    return Ok(BookUpdate { version, event_time: None });
                }
            }
            () = tokio::time::sleep_until(deadline) => {
                return Err(DepthsyncError::SyncTimeout);
            }
            _ = shutdown.changed() => {
                return Err(DepthsyncError::Cancelled);
            }
        }
    }
}

/// Background processing loop: applies updates until shutdown or disconnect.
async fn run_loop<F: SnapshotFetcher + ?Sized>(
    config: TrackerConfig,
    classifier: Classifier,
    fetcher: Arc<F>,
    mut subscription: Subscription,
    mut engine: SyncEngine,
    shared: Arc<TrackerShared>,
    mut shutdown: watch::Receiver<bool>,
) {
    let stream_name = config.stream_name();

    loop {
        tokio::select! {
            frame = subscription.frames.recv() => {
                let Some(frame) = frame else {
                    warn!(instrument = %config.instrument, "Stream ended");
                    engine.on_disconnect();
                    shared.publish(&engine);
                    break;
                };
                let keep_going = handle_frame(
                    &config,
                    &classifier,
                    fetcher.as_ref(),
                    &mut subscription.frames,
                    &mut engine,
                    &shared,
                    &mut shutdown,
                    &stream_name,
                    &frame,
                )
                .await;
                if !keep_going {
                    break;
                }
            }
            _ = shutdown.changed() => {
                info!(instrument = %config.instrument, "Tracker stopped");
                engine.on_disconnect();
                shared.publish(&engine);
                break;
            }
        }
    }

    if let Some(stop) = subscription.stop.take() {
        let _ = stop.send(());
    }
}

/// Routes one frame while synced. Returns `false` when the loop must exit.
#[allow(clippy::too_many_arguments)]
async fn handle_frame<F: SnapshotFetcher + ?Sized>(
    config: &TrackerConfig,
    classifier: &Classifier,
    fetcher: &F,
    frames: &mut mpsc::UnboundedReceiver<Value>,
    engine: &mut SyncEngine,
    shared: &TrackerShared,
    shutdown: &mut watch::Receiver<bool>,
    stream_name: &str,
    frame: &Value,
) -> bool {
    match classifier.classify(frame) {
        Some(tag) if tag == stream_name => {}
        Some(tag) => {
            debug!(tag, "Frame for another channel, dropping");
            return true;
        }
        None => {
            warn!(instrument = %config.instrument, "Unclassified frame dropped");
            return true;
        }
    }

    if config.depth_limit.is_some() {
        let Some(snapshot) = decode_payload::<DepthSnapshot>(frame) else {
            return true;
        };
        if let TopNOutcome::Installed { version } = engine.on_topn_snapshot(&snapshot) {
            shared.publish(engine);
            shared.notify(BookUpdate {
                version,
                event_time: None,
            });
        }
        return true;
    }

    let Some(diff) = decode_payload::<DepthDiff>(frame) else {
        return true;
    };
    match engine.on_diff(diff) {
        DiffOutcome::Applied {
            version,
            event_time,
        } => {
            shared.publish(engine);
            shared.notify(BookUpdate {
                version,
                event_time: Some(event_time),
            });
        }
        DiffOutcome::Gap => {
            shared.publish(engine);
            match sync_full_depth(config, classifier, fetcher, frames, engine, shutdown).await {
                Ok(update) => {
                    shared.publish(engine);
                    shared.notify(update);
                    info!(
                        instrument = %config.instrument,
                        version = update.version,
                        "Resync complete"
                    );
                }
                Err(DepthsyncError::Cancelled) => {
                    engine.on_disconnect();
                    shared.publish(engine);
                    return false;
                }
                Err(e) => {
                    // No caller is suspended on a background resync; surface
                    // the failure through status and let the owner restart.
                    error!(instrument = %config.instrument, error = %e, "Resync failed");
                    engine.on_disconnect();
                    shared.publish(engine);
                    return false;
                }
            }
        }
        DiffOutcome::Buffered | DiffOutcome::Stale | DiffOutcome::Dropped => {}
    }
    true
}

/// Routes a frame received while a snapshot fetch is outstanding; diffs
/// for this instrument are buffered by the engine, everything else drops.
fn buffer_frame(
    classifier: &Classifier,
    engine: &mut SyncEngine,
    stream_name: &str,
    frame: &Value,
) {
    match classifier.classify(frame) {
        Some(tag) if tag == stream_name => {
            if let Some(diff) = decode_payload::<DepthDiff>(frame) {
                let _ = engine.on_diff(diff);
            }
        }
        Some(tag) => debug!(tag, "Frame for another channel, dropping"),
        None => warn!("Unclassified frame dropped"),
    }
}

/// Decodes a frame's payload, logging and dropping malformed frames.
fn decode_payload<T: serde::de::DeserializeOwned>(frame: &Value) -> Option<T> {
    match serde_json::from_value(frame_payload(frame).clone()) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(error = %e, "Malformed frame payload dropped");
            None
        }
    }
}
