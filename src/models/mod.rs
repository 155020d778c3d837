//! Shared models for stream messages.
//!
//! Contains depth stream payload types plus the subscribe/unsubscribe
//! request frames sent over the combined-stream WebSocket connection.

pub mod book;

use serde::Serialize;

/// A `SUBSCRIBE` request sent over the stream connection.
#[derive(Serialize)]
pub struct SubscribeRequest {
    pub method: String,
    pub params: Vec<String>,
    pub id: u64,
}

impl SubscribeRequest {
    #[must_use]
    pub fn new(streams: &[String], id: u64) -> Self {
        Self {
            method: "SUBSCRIBE".to_string(),
            params: streams.to_vec(),
            id,
        }
    }
}

/// An `UNSUBSCRIBE` request sent over the stream connection.
#[derive(Serialize)]
pub struct UnsubscribeRequest {
    pub method: String,
    pub params: Vec<String>,
    pub id: u64,
}

impl UnsubscribeRequest {
    #[must_use]
    pub fn new(streams: &[String], id: u64) -> Self {
        Self {
            method: "UNSUBSCRIBE".to_string(),
            params: streams.to_vec(),
            id,
        }
    }
}

/// Returns the payload of a combined-stream frame.
///
/// Combined-stream frames wrap the channel payload in a `data` envelope next
/// to the `stream` routing field; direct-connection frames are unwrapped.
#[must_use]
pub fn frame_payload(frame: &serde_json::Value) -> &serde_json::Value {
    frame.get("data").unwrap_or(frame)
}
