//! Durable object storage tier: one full block message per height.

use crate::streamer_core::fetcher::{BlockFetcher, FetchError, FetchOutcome};
use crate::streamer_core::types::BlockMessage;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

pub struct ObjectStoreFetcher {
    client: Client,
    base_url: String,
}

impl ObjectStoreFetcher {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn block_url(&self, height: u64) -> String {
        format!("{}/{:012}/block.json", self.base_url, height)
    }
}

#[async_trait]
impl BlockFetcher for ObjectStoreFetcher {
    fn tier(&self) -> &'static str {
        "object_store"
    }

    async fn fetch(&self, height: u64) -> Result<FetchOutcome, FetchError> {
        let response = self.client.get(self.block_url(height)).send().await?;

        match response.status() {
            // Missing keys come back as 403 from buckets without list permission.
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(FetchOutcome::NotFound),
            status if status.is_success() => {
                let bytes = response.bytes().await?;
                let block: BlockMessage = serde_json::from_slice(&bytes)?;
                Ok(FetchOutcome::Found(block))
            }
            status => Err(FetchError::Http(format!(
                "object store returned {} for height {}",
                status, height
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_url_is_zero_padded() {
        let fetcher = ObjectStoreFetcher::new("https://blocks.example/mainnet/", 5).unwrap();
        assert_eq!(
            fetcher.block_url(9_820_210),
            "https://blocks.example/mainnet/000009820210/block.json"
        );
    }
}
