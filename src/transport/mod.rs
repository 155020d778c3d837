//! Async WebSocket transport implementing [`StreamSource`].
//!
//! The tracker core never touches the wire; this module supplies the
//! production collaborator: connect, send a subscribe request, and forward
//! every decoded frame into the subscription channel until the connection
//! drops or the stop handle fires.

pub mod snapshot;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use tungstenite::Message;

use crate::error::{DepthsyncError, Result};
use crate::models::{SubscribeRequest, UnsubscribeRequest};
use crate::sync::{StreamSource, Subscription};

/// Write half of a stream WebSocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a stream WebSocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`DepthsyncError`](crate::DepthsyncError) if the connection or
/// TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, _) = connect_async(url).await?;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// [`StreamSource`] backed by a combined-stream WebSocket connection.
///
/// Each `subscribe` call opens its own connection, so trackers for
/// different instruments fail independently.
pub struct WsStreamSource {
    url: String,
}

impl WsStreamSource {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl StreamSource for WsStreamSource {
    async fn subscribe(&self, streams: &[String]) -> Result<Subscription> {
        let (mut write, read) = connect(&self.url)
            .await
            .map_err(|e| DepthsyncError::Subscription(e.to_string()))?;

        let request = SubscribeRequest::new(streams, 1);
        let json = serde_json::to_string(&request)?;
        debug!("Sending subscribe request: {}", json);
        write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| DepthsyncError::Subscription(e.to_string()))?;
        info!(?streams, "Subscribed to streams");

        let (tx, frames) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(forward_frames(write, read, streams.to_vec(), tx, stop_rx));

        Ok(Subscription {
            frames,
            stop: Some(stop_tx),
        })
    }
}

/// Forwards decoded text frames into the subscription channel until the
/// connection drops, the receiver is gone, or the stop handle fires.
async fn forward_frames(
    mut write: WsWriter,
    mut read: WsReader,
    streams: Vec<String>,
    tx: mpsc::UnboundedSender<serde_json::Value>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<serde_json::Value>(&text) {
                            Ok(value) => {
                                if tx.send(value).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "Discarding undecodable frame"),
                        }
                    }
                    Some(Ok(_)) => {} // Binary/Ping/Pong/Close frames
                    Some(Err(e)) => {
                        warn!("WebSocket error: {e}");
                        break;
                    }
                    None => {
                        warn!("WebSocket stream ended");
                        break;
                    }
                }
            }

            _ = &mut stop => {
                let request = UnsubscribeRequest::new(&streams, 2);
                if let Ok(json) = serde_json::to_string(&request) {
                    let _ = write.send(Message::Text(json.into())).await;
                }
                let _ = write.send(Message::Close(None)).await;
                info!(?streams, "Unsubscribed from streams");
                break;
            }
        }
    }
}
