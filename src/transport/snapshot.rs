//! REST depth snapshot fetcher implementing [`SnapshotFetcher`].

use async_trait::async_trait;
use tracing::debug;

use crate::error::{DepthsyncError, Result};
use crate::models::book::DepthSnapshot;
use crate::sync::SnapshotFetcher;

/// Depth requested when the tracker runs without a limit.
const DEFAULT_SNAPSHOT_DEPTH: u16 = 1000;

/// [`SnapshotFetcher`] backed by the exchange's REST depth endpoint.
pub struct RestSnapshotFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl RestSnapshotFetcher {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SnapshotFetcher for RestSnapshotFetcher {
    async fn fetch_snapshot(&self, instrument: &str, depth: Option<u16>) -> Result<DepthSnapshot> {
        let limit = depth.unwrap_or(DEFAULT_SNAPSHOT_DEPTH).to_string();
        let url = format!("{}/api/v3/depth", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", instrument.to_uppercase().as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DepthsyncError::Snapshot(format!(
                "depth endpoint returned {}",
                response.status()
            )));
        }

        // A snapshot body that does not decode is a fetch failure, not a
        // droppable frame.
        let snapshot: DepthSnapshot = response
            .json()
            .await
            .map_err(|e| DepthsyncError::Snapshot(e.to_string()))?;

        debug!(
            instrument,
            last_update_id = snapshot.last_update_id,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "Fetched depth snapshot"
        );

        Ok(snapshot)
    }
}
