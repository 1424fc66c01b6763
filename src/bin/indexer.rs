//! Indexer Binary - block source → decoder → event store
//!
//! Streams blocks in height order from the configured tiers, decodes them into
//! canonical events and writes them idempotently. A missing block or a broken
//! parent link is fatal: the process exits with status 1 and a supervisor
//! restarts it from the last stored block.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin indexer
//! ```
//!
//! ## Environment Variables
//!
//! - BLOCK_SOURCE - `object_store` or `live_feed` (default: object_store)
//! - OBJECT_STORE_URL / LIVE_FEED_URL - tier endpoints
//! - ARCHIVE_DIR - packaged historical archive (optional)
//! - START_HEIGHT / STOP_HEIGHT - range to ingest
//! - NEARFLOW_DB_PATH - SQLite database path (default: /var/lib/nearflow/nearflow.db)
//! - RUST_LOG - Logging level (optional, default: info)

use dotenv::dotenv;
use log::{error, info, warn};
use nearflow::pipeline::{ingestion_checkpoint, open_store, run_ingestion, PipelineConfig, SqliteWriter};
use nearflow::streamer_core::{build_tiered_fetcher, BlockStream, SourceConfig, SourceMetrics, StreamSettings};
use std::sync::Arc;
use tokio::time::{interval, timeout, Duration};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let source_config = SourceConfig::from_env()?;
    let pipeline_config = PipelineConfig::from_env();

    info!("🚀 nearflow indexer");
    info!("   ├─ Backend: {:?}", source_config.backend);
    info!("   ├─ Database: {}", pipeline_config.db_path);
    info!("   ├─ Prefetch pool: {}", source_config.prefetch_pool_size);
    info!("   └─ Buffer: {} blocks", source_config.buffer_size);

    // Resume after the last stored block when it is past START_HEIGHT.
    let mut settings = StreamSettings::from_config(&source_config);
    {
        let conn = open_store(&pipeline_config.db_path, &pipeline_config.schema_dir)?;
        if let Some((height, hash)) = ingestion_checkpoint(&conn)? {
            if height + 1 >= settings.start_height {
                info!("🔄 Resuming after stored block {} ({})", height, hash);
                settings.start_height = height + 1;
                settings.resume_hash = Some(hash);
            } else {
                warn!(
                    "⚠️  START_HEIGHT {} is past the last stored block {}; starting there",
                    settings.start_height, height
                );
            }
        }
    }
    if let Some(stop) = settings.stop_height {
        if settings.start_height > stop {
            info!("✅ Nothing to do: already past STOP_HEIGHT {}", stop);
            return Ok(());
        }
    }

    let metrics = SourceMetrics::new();
    let (fetcher, upload_task) = build_tiered_fetcher(&source_config, metrics.clone())?;
    let fetcher = Arc::new(fetcher);

    let metrics_interval = pipeline_config.metrics_log_interval_secs.max(1);
    let metrics_task = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(metrics_interval));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!("📈 Block cache: {} entries", metrics.cache_size.get());
            match metrics.encode() {
                Ok(text) => log::debug!("{}", text),
                Err(e) => warn!("⚠️  Failed to encode metrics: {}", e),
            }
        }
    });

    let mut writer = SqliteWriter::new(&pipeline_config.db_path, &pipeline_config.schema_dir)?
        .with_batching(pipeline_config.flush_batch_blocks, pipeline_config.decode_chunk_size);
    let stream = BlockStream::open(fetcher, settings);

    let result = run_ingestion(stream, &mut writer, pipeline_config.flush_interval_ms).await;
    metrics_task.abort();

    match result {
        Ok(stats) => {
            info!(
                "✅ Indexer finished: {} blocks, {} events, last height {:?}",
                stats.blocks, stats.events, stats.last_height
            );
            if let Some(handle) = upload_task {
                match timeout(Duration::from_secs(30), handle).await {
                    Ok(Ok(written)) => info!("📦 Archive write-back stored {} blocks", written),
                    Ok(Err(e)) => warn!("⚠️  Archive write-back task failed: {}", e),
                    Err(_) => warn!("⚠️  Archive write-back still draining at exit"),
                }
            }
            Ok(())
        }
        Err(e) => {
            error!("❌ Indexer stopped: {}", e);
            std::process::exit(1);
        }
    }
}
