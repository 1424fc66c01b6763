//! Live/historical HTTP feed tier (neardata-style API).
//!
//! `GET {base}/v0/block/{height}` returns the block message, or JSON `null`
//! when the chain skipped that height. `GET {base}/v0/last_block/final`
//! returns the current final block.

use crate::streamer_core::fetcher::{BlockFetcher, FetchError, FetchOutcome};
use crate::streamer_core::types::BlockMessage;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

pub struct LiveFeedFetcher {
    client: Client,
    base_url: String,
}

impl LiveFeedFetcher {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Interpret a feed body: `null` means the height was skipped.
pub fn parse_feed_body(bytes: &[u8]) -> Result<FetchOutcome, FetchError> {
    let value: Value = serde_json::from_slice(bytes)?;
    if value.is_null() {
        return Ok(FetchOutcome::Skipped);
    }
    let block: BlockMessage = serde_json::from_value(value)?;
    Ok(FetchOutcome::Found(block))
}

#[async_trait]
impl BlockFetcher for LiveFeedFetcher {
    fn tier(&self) -> &'static str {
        "live_feed"
    }

    async fn fetch(&self, height: u64) -> Result<FetchOutcome, FetchError> {
        let url = format!("{}/v0/block/{}", self.base_url, height);
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(FetchOutcome::NotFound),
            status if status.is_success() => parse_feed_body(&response.bytes().await?),
            status => Err(FetchError::Http(format!(
                "live feed returned {} for height {}",
                status, height
            ))),
        }
    }

    async fn latest_height(&self) -> Result<Option<u64>, FetchError> {
        let url = format!("{}/v0/last_block/final", self.base_url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        let value: Value = response.json().await?;
        Ok(value
            .pointer("/block/header/height")
            .and_then(Value::as_u64))
    }
}
