//! Crate-level error types.
//!
//! [`DepthsyncError`] unifies every error source (configuration, WebSocket,
//! HTTP, JSON, synchronization outcomes) behind a single enum so callers can
//! match on the variant they care about while still using the `?` operator
//! for easy propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DepthsyncError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum DepthsyncError {
    /// A configuration value is missing, inconsistent, or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An HTTP request to the snapshot endpoint failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The snapshot endpoint returned a response that could not be used.
    #[error("snapshot fetch failed: {0}")]
    Snapshot(String),

    /// Subscribing to the update stream failed.
    #[error("stream subscription failed: {0}")]
    Subscription(String),

    /// Synchronization did not complete within the configured timeout.
    #[error("synchronization timed out")]
    SyncTimeout,

    /// The operation was cancelled by a stop request.
    #[error("operation cancelled")]
    Cancelled,

    /// The update stream disconnected before synchronization completed.
    #[error("stream disconnected")]
    Disconnected,
}
