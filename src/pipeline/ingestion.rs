//! Ingestion loop: block stream -> decoder -> event store.
//!
//! Blocks are consumed strictly in height order. A fatal source error stops
//! ingestion after flushing what was already decoded, so a restart resumes
//! from the last stored block.

use crate::decoder::{decode_block, DecodeError};
use crate::pipeline::writer_backend::{WriterBackend, WriterError};
use crate::streamer_core::{BlockStream, SourceError};
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Debug)]
pub enum IngestionError {
    Source(SourceError),
    Decode { height: u64, error: DecodeError },
    Writer(WriterError),
}

impl From<WriterError> for IngestionError {
    fn from(err: WriterError) -> Self {
        IngestionError::Writer(err)
    }
}

impl std::fmt::Display for IngestionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestionError::Source(e) => write!(f, "Source error: {}", e),
            IngestionError::Decode { height, error } => {
                write!(f, "Decode error at height {}: {}", height, error)
            }
            IngestionError::Writer(e) => write!(f, "Writer error: {}", e),
        }
    }
}

impl std::error::Error for IngestionError {}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestionStats {
    pub blocks: u64,
    pub events: u64,
    pub last_height: Option<u64>,
}

/// Run until the stream ends (stop height reached) or fails.
pub async fn run_ingestion(
    mut stream: BlockStream,
    writer: &mut dyn WriterBackend,
    flush_interval_ms: u64,
) -> Result<IngestionStats, IngestionError> {
    log::info!("🚀 Starting block ingestion ({} backend)", writer.backend_type());
    log::info!("   └─ Flush interval: {}ms", flush_interval_ms);

    let mut flush_timer = interval(Duration::from_millis(flush_interval_ms.max(1)));
    flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = IngestionStats::default();
    let mut window_blocks = 0u64;
    let mut last_log_time = std::time::Instant::now();

    loop {
        tokio::select! {
            next = stream.next() => {
                match next {
                    Some(Ok(block)) => {
                        let height = block.height();
                        let events = decode_block(&block).map_err(|error| {
                            IngestionError::Decode { height, error }
                        })?;

                        stats.events += events.len() as u64;
                        stats.blocks += 1;
                        stats.last_height = Some(height);
                        window_blocks += 1;

                        writer.write_block(&block, events).await?;

                        if last_log_time.elapsed().as_secs() >= 10 {
                            let blocks_per_sec = window_blocks as f64 / last_log_time.elapsed().as_secs_f64();
                            log::info!(
                                "📊 Ingestion rate: {:.1} blocks/sec (height: {}, events: {})",
                                blocks_per_sec, height, stats.events
                            );
                            last_log_time = std::time::Instant::now();
                            window_blocks = 0;
                        }
                    }
                    Some(Err(e)) => {
                        log::error!("❌ Fatal source error: {}", e);
                        log::info!("🔄 Flushing {} decoded blocks before exit...", writer.pending_blocks());
                        writer.flush().await?;
                        return Err(IngestionError::Source(e));
                    }
                    None => {
                        log::info!("🔄 Stream finished, performing final flush...");
                        writer.flush().await?;
                        break;
                    }
                }
            }

            _ = flush_timer.tick() => {
                let pending = writer.pending_blocks();
                if pending > 0 {
                    writer.flush().await?;
                    log::debug!(
                        "Flushed {} blocks | buffered from source: {}",
                        pending,
                        stream.buffered()
                    );
                }
            }
        }
    }

    log::info!(
        "✅ Ingestion stopped at height {:?} ({} blocks, {} events)",
        stats.last_height,
        stats.blocks,
        stats.events
    );
    Ok(stats)
}
