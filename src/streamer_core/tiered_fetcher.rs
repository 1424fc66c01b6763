//! Cache-fronted chain of block tiers, tried in order.

use crate::streamer_core::block_cache::BlockCache;
use crate::streamer_core::fetcher::{BlockFetcher, FetchError, FetchOutcome};
use crate::streamer_core::metrics::SourceMetrics;
use crate::streamer_core::upload_queue::UploadQueue;
use std::sync::Arc;
use std::time::Instant;

pub struct TieredFetcher {
    tiers: Vec<Arc<dyn BlockFetcher>>,
    cache: BlockCache,
    metrics: SourceMetrics,
    upload_queue: Option<UploadQueue>,
}

impl TieredFetcher {
    pub fn new(
        tiers: Vec<Arc<dyn BlockFetcher>>,
        cache_capacity: usize,
        metrics: SourceMetrics,
    ) -> Self {
        Self {
            tiers,
            cache: BlockCache::new(cache_capacity, metrics.clone()),
            metrics,
            upload_queue: None,
        }
    }

    /// Archive blocks that were not already served by the archive tier.
    pub fn with_upload_queue(mut self, queue: UploadQueue) -> Self {
        self.upload_queue = Some(queue);
        self
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    pub fn metrics(&self) -> &SourceMetrics {
        &self.metrics
    }

    pub async fn fetch(&self, height: u64) -> Result<FetchOutcome, FetchError> {
        self.cache
            .get_or_fetch(height, || self.fetch_from_tiers(height))
            .await
    }

    /// First tier that can report a head wins.
    pub async fn latest_height(&self) -> Option<u64> {
        for tier in &self.tiers {
            match tier.latest_height().await {
                Ok(Some(head)) => return Some(head),
                Ok(None) => {}
                Err(e) => log::debug!("{} could not report head: {}", tier.tier(), e),
            }
        }
        None
    }

    /// `Skipped` from any tier is authoritative. `NotFound` falls through to
    /// the next tier. If nothing was found and some tier errored, the last
    /// error is returned so the caller retries.
    async fn fetch_from_tiers(&self, height: u64) -> Result<FetchOutcome, FetchError> {
        let mut last_error = None;

        for tier in &self.tiers {
            let started = Instant::now();
            let result = tier.fetch(height).await;
            let elapsed = started.elapsed().as_secs_f64();

            match result {
                Ok(FetchOutcome::Found(block)) => {
                    self.metrics.record_fetch(tier.tier(), "found", elapsed);
                    if tier.tier() != "archive" {
                        if let Some(queue) = &self.upload_queue {
                            queue.enqueue(block.clone());
                        }
                    }
                    return Ok(FetchOutcome::Found(block));
                }
                Ok(FetchOutcome::Skipped) => {
                    self.metrics.record_fetch(tier.tier(), "skipped", elapsed);
                    return Ok(FetchOutcome::Skipped);
                }
                Ok(FetchOutcome::NotFound) => {
                    self.metrics.record_fetch(tier.tier(), "not_found", elapsed);
                }
                Err(e) => {
                    self.metrics.record_fetch(tier.tier(), "error", elapsed);
                    log::warn!("⚠️  {} failed for height {}: {}", tier.tier(), height, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(FetchOutcome::NotFound),
        }
    }
}
