//! Block source: tiered fetchers behind a dedup cache, exposed as an ordered
//! gap-checked stream.

pub mod archive;
pub mod block_cache;
pub mod config;
pub mod error_handler;
pub mod fetcher;
pub mod live_feed;
pub mod metrics;
pub mod object_store;
pub mod stream;
pub mod tiered_fetcher;
pub mod types;
pub mod upload_queue;

pub use config::{BackendType, ConfigError, SourceConfig};
pub use fetcher::{BlockFetcher, FetchError, FetchOutcome};
pub use metrics::SourceMetrics;
pub use stream::{BlockStream, SourceError, StreamSettings};
pub use tiered_fetcher::TieredFetcher;
pub use types::BlockMessage;

use archive::ArchiveFetcher;
use live_feed::LiveFeedFetcher;
use object_store::ObjectStoreFetcher;
use std::sync::Arc;
use tokio::task::JoinHandle;
use upload_queue::UploadQueue;

/// Build the tier chain described by `config`: local archive first (when
/// configured), then the primary backend, then the other network backend.
///
/// Returns the upload queue task handle when archive write-back is enabled.
pub fn build_tiered_fetcher(
    config: &SourceConfig,
    metrics: SourceMetrics,
) -> Result<(TieredFetcher, Option<JoinHandle<u64>>), FetchError> {
    let mut tiers: Vec<Arc<dyn BlockFetcher>> = Vec::new();

    let archive = config
        .archive_dir
        .as_ref()
        .map(|dir| Arc::new(ArchiveFetcher::new(dir)));
    if let Some(archive) = &archive {
        tiers.push(archive.clone());
    }

    let object_store: Option<Arc<dyn BlockFetcher>> = match &config.object_store_url {
        Some(url) => Some(Arc::new(ObjectStoreFetcher::new(url, config.request_timeout_secs)?)),
        None => None,
    };
    let live_feed: Option<Arc<dyn BlockFetcher>> = match &config.live_feed_url {
        Some(url) => Some(Arc::new(LiveFeedFetcher::new(url, config.request_timeout_secs)?)),
        None => None,
    };

    let (primary, fallback) = match config.backend {
        BackendType::ObjectStore => (object_store, live_feed),
        BackendType::LiveFeed => (live_feed, object_store),
    };
    tiers.extend(primary);
    tiers.extend(fallback);

    let mut fetcher = TieredFetcher::new(tiers, config.cache_capacity, metrics);

    let mut upload_task = None;
    if let (Some(archive), true) = (archive, config.archive_write_back) {
        let (queue, handle) = UploadQueue::spawn(archive, config.buffer_size * 4);
        fetcher = fetcher.with_upload_queue(queue);
        upload_task = Some(handle);
    }

    log::info!("📦 Block tiers: {:?}", fetcher.tier_names());
    Ok((fetcher, upload_task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tier_order_follows_backend() {
        let mut config = SourceConfig::local(1);
        config.object_store_url = Some("https://lake.example".to_string());
        config.live_feed_url = Some("https://feed.example".to_string());
        config.archive_dir = Some(std::env::temp_dir().join("nearflow-tier-order"));

        let (fetcher, upload) = build_tiered_fetcher(&config, SourceMetrics::new()).unwrap();
        assert_eq!(fetcher.tier_names(), vec!["archive", "object_store", "live_feed"]);
        assert!(upload.is_none());

        config.backend = BackendType::LiveFeed;
        config.archive_dir = None;
        let (fetcher, _) = build_tiered_fetcher(&config, SourceMetrics::new()).unwrap();
        assert_eq!(fetcher.tier_names(), vec!["live_feed", "object_store"]);
    }
}
