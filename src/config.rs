//! Tracker and endpoint configuration.
//!
//! [`TrackerConfig`] is constructed once per tracked instrument and passed by
//! value; there are no shared default singletons. Endpoints are loaded from
//! environment variables:
//! - `DEPTHSYNC_WEBSOCKET_URL` — overrides the default stream endpoint
//! - `DEPTHSYNC_REST_URL` — overrides the default snapshot endpoint

use std::time::Duration;

/// Default public WebSocket stream endpoint.
const DEFAULT_WEBSOCKET_URL: &str = "wss://stream.binance.com:9443/stream";

/// Default REST endpoint used for depth snapshots.
const DEFAULT_REST_URL: &str = "https://api.binance.com";

/// Default deadline for reaching a synchronized book.
const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on diffs buffered while a snapshot fetch is in flight.
const DEFAULT_MAX_BUFFERED_DIFFS: usize = 10_000;

/// Per-instrument tracker configuration.
///
/// `depth_limit` selects the operating mode: `None` maintains the full book
/// by merging incremental diffs; `Some(n)` tracks only the best `n` levels
/// per side via periodic wholesale replacement.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub instrument: String,
    pub depth_limit: Option<u16>,
    pub update_interval_ms: Option<u32>,
    pub sync_timeout: Duration,
    pub max_buffered_diffs: usize,
}

impl TrackerConfig {
    /// Creates a full-depth configuration for the given instrument.
    #[must_use]
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            depth_limit: None,
            update_interval_ms: None,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            max_buffered_diffs: DEFAULT_MAX_BUFFERED_DIFFS,
        }
    }

    /// Switches to top-N mode, tracking only the best `depth` levels per side.
    #[must_use]
    pub fn with_depth_limit(mut self, depth: u16) -> Self {
        self.depth_limit = Some(depth);
        self
    }

    /// Requests a specific server-side update interval in milliseconds.
    #[must_use]
    pub fn with_update_interval_ms(mut self, interval: u32) -> Self {
        self.update_interval_ms = Some(interval);
        self
    }

    /// Overrides the synchronization deadline.
    #[must_use]
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Returns the stream name this instrument's updates arrive on.
    ///
    /// Full-depth mode subscribes to the diff stream (`{symbol}@depth`);
    /// top-N mode subscribes to the partial book stream
    /// (`{symbol}@depth{n}`). An update interval appends `@{ms}ms`.
    #[must_use]
    pub fn stream_name(&self) -> String {
        let symbol = self.instrument.to_lowercase();
        let mut name = match self.depth_limit {
            Some(depth) => format!("{symbol}@depth{depth}"),
            None => format!("{symbol}@depth"),
        };
        if let Some(interval) = self.update_interval_ms {
            name.push_str(&format!("@{interval}ms"));
        }
        name
    }
}

/// Upstream endpoints for the stream and snapshot collaborators.
#[derive(Debug)]
pub struct EndpointConfig {
    pub websocket_url: String,
    pub rest_url: String,
}

/// Loads endpoint configuration from environment variables.
///
/// Both URLs fall back to the default public endpoints and can be
/// overridden with `DEPTHSYNC_WEBSOCKET_URL` and `DEPTHSYNC_REST_URL`.
///
/// # Errors
///
/// Returns [`DepthsyncError::Config`](crate::DepthsyncError::Config) if an
/// override is set but does not look like a URL for its scheme.
pub fn fetch_config() -> crate::Result<EndpointConfig> {
    let websocket_url = non_empty_var("DEPTHSYNC_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());
    let rest_url =
        non_empty_var("DEPTHSYNC_REST_URL").unwrap_or_else(|| DEFAULT_REST_URL.to_string());

    if !websocket_url.starts_with("ws://") && !websocket_url.starts_with("wss://") {
        return Err(crate::DepthsyncError::Config(format!(
            "DEPTHSYNC_WEBSOCKET_URL must be a ws:// or wss:// URL, got {websocket_url}"
        )));
    }
    if !rest_url.starts_with("http://") && !rest_url.starts_with("https://") {
        return Err(crate::DepthsyncError::Config(format!(
            "DEPTHSYNC_REST_URL must be an http:// or https:// URL, got {rest_url}"
        )));
    }

    Ok(EndpointConfig {
        websocket_url,
        rest_url,
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
