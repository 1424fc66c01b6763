//! Ordered, gap-checked block stream with bounded prefetch.
//!
//! A producer task keeps up to `prefetch_pool_size` fetches in flight for the
//! heights after the one it is waiting on and hands finished blocks to the
//! consumer through a bounded channel. While the channel is full the producer
//! is parked on `send`, so no further prefetches are issued.
//!
//! Tiers without a skip marker report a height the chain never produced as
//! not found. Such a hole is stepped over only when a later block links to
//! the last delivered hash; anything else is retried and then fatal.

use crate::streamer_core::config::SourceConfig;
use crate::streamer_core::error_handler::ExponentialBackoff;
use crate::streamer_core::fetcher::{FetchError, FetchOutcome};
use crate::streamer_core::tiered_fetcher::TieredFetcher;
use crate::streamer_core::types::BlockMessage;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Fatal stream conditions. Ingestion must stop on either: continuing would
/// leave a hole in the height sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The block does not link to the previously delivered block.
    Gap {
        height: u64,
        expected_prev_hash: String,
        actual_prev_hash: String,
    },
    /// Every tier failed or lacked the height after all retries.
    MissingBlock {
        height: u64,
        attempts: u32,
        last_error: Option<String>,
    },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Gap {
                height,
                expected_prev_hash,
                actual_prev_hash,
            } => write!(
                f,
                "Chain gap at height {}: expected prev_hash {}, got {}",
                height, expected_prev_hash, actual_prev_hash
            ),
            SourceError::MissingBlock {
                height,
                attempts,
                last_error,
            } => write!(
                f,
                "Block {} unavailable from every tier after {} retries (last error: {})",
                height,
                attempts,
                last_error.as_deref().unwrap_or("not found")
            ),
        }
    }
}

impl std::error::Error for SourceError {}

/// Knobs the producer needs, split out of `SourceConfig` so tests can build
/// them directly.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub start_height: u64,
    pub stop_height: Option<u64>,
    /// Hash of the block just before `start_height`, when resuming.
    pub resume_hash: Option<String>,
    pub prefetch_pool_size: usize,
    pub buffer_size: usize,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    pub max_retries: u32,
    pub no_new_blocks_throttle_ms: u64,
}

impl StreamSettings {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            start_height: config.start_height,
            stop_height: config.stop_height,
            resume_hash: None,
            prefetch_pool_size: config.prefetch_pool_size.max(1),
            buffer_size: config.buffer_size.max(1),
            retry_initial_ms: config.retry_initial_ms,
            retry_max_ms: config.retry_max_ms,
            max_retries: config.max_retries,
            no_new_blocks_throttle_ms: config.no_new_blocks_throttle_ms,
        }
    }
}

pub struct BlockStream {
    rx: mpsc::Receiver<Result<BlockMessage, SourceError>>,
    producer: JoinHandle<()>,
}

impl BlockStream {
    /// Start streaming from `settings.start_height`.
    pub fn open(fetcher: Arc<TieredFetcher>, settings: StreamSettings) -> Self {
        let (tx, rx) = mpsc::channel(settings.buffer_size.max(1));
        let producer = tokio::spawn(produce(fetcher, settings, tx));
        Self { rx, producer }
    }

    /// Next block in height order. `None` once `stop_height` has been
    /// delivered. After an `Err` the stream is finished.
    pub async fn next(&mut self) -> Option<Result<BlockMessage, SourceError>> {
        self.rx.recv().await
    }

    /// Blocks buffered and ready for the consumer.
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }
}

impl Drop for BlockStream {
    fn drop(&mut self) {
        self.producer.abort();
    }
}

/// Furthest the producer looks past a not-found height for a block that
/// links back to the last delivered one.
const SKIP_LOOKAHEAD: usize = 16;

type FetchResult = Result<FetchOutcome, FetchError>;
type Prefetch = JoinHandle<FetchResult>;

/// A prefetched height: still running, or already awaited by a lookahead.
enum Slot {
    InFlight(Prefetch),
    Ready(FetchResult),
}

fn joined(result: Result<FetchResult, tokio::task::JoinError>) -> FetchResult {
    match result {
        Ok(result) => result,
        Err(join_err) => Err(FetchError::Http(format!("fetch task failed: {}", join_err))),
    }
}

impl Slot {
    async fn settle(&mut self) {
        if let Slot::InFlight(handle) = self {
            let result = joined(handle.await);
            *self = Slot::Ready(result);
        }
    }

    async fn into_result(self) -> FetchResult {
        match self {
            Slot::InFlight(handle) => joined(handle.await),
            Slot::Ready(result) => result,
        }
    }
}

fn spawn_fetch(fetcher: &Arc<TieredFetcher>, height: u64) -> Slot {
    let fetcher = fetcher.clone();
    Slot::InFlight(tokio::spawn(async move { fetcher.fetch(height).await }))
}

fn abort_all(pending: &mut VecDeque<(u64, Slot)>) {
    for (_, slot) in pending.drain(..) {
        if let Slot::InFlight(handle) = slot {
            handle.abort();
        }
    }
}

/// Height of the first later block found, when it links straight to
/// `last_hash`. The heights before it were then never produced by the chain.
///
/// Without a delivered block yet there is nothing to link to, and the first
/// block found is taken as the start.
async fn linked_successor(
    fetcher: &Arc<TieredFetcher>,
    pending: &mut VecDeque<(u64, Slot)>,
    next_to_spawn: &mut u64,
    last_hash: Option<&str>,
    within_stop: impl Fn(u64) -> bool,
) -> Option<u64> {
    let mut i = 0;
    loop {
        if i == pending.len() {
            if i >= SKIP_LOOKAHEAD || !within_stop(*next_to_spawn) {
                return None;
            }
            pending.push_back((*next_to_spawn, spawn_fetch(fetcher, *next_to_spawn)));
            *next_to_spawn += 1;
        }

        let slot = &mut pending[i].1;
        slot.settle().await;
        match slot {
            Slot::Ready(Ok(FetchOutcome::Found(block))) => {
                let links = last_hash.map_or(true, |hash| block.prev_hash() == hash);
                return if links { Some(block.height()) } else { None };
            }
            Slot::Ready(Ok(FetchOutcome::Skipped | FetchOutcome::NotFound)) => i += 1,
            _ => return None,
        }
    }
}

async fn produce(
    fetcher: Arc<TieredFetcher>,
    settings: StreamSettings,
    tx: mpsc::Sender<Result<BlockMessage, SourceError>>,
) {
    let mut pending: VecDeque<(u64, Slot)> = VecDeque::new();
    let mut next_to_spawn = settings.start_height;
    let mut last_hash = settings.resume_hash.clone();
    let mut backoff = ExponentialBackoff::new(
        settings.retry_initial_ms,
        settings.retry_max_ms,
        settings.max_retries,
    );
    let throttle = Duration::from_millis(settings.no_new_blocks_throttle_ms);
    let within_stop = |h: u64| settings.stop_height.map_or(true, |stop| h <= stop);

    log::info!(
        "🚀 Block stream starting at {} (prefetch: {}, buffer: {})",
        settings.start_height,
        settings.prefetch_pool_size,
        settings.buffer_size
    );

    loop {
        while pending.len() < settings.prefetch_pool_size && within_stop(next_to_spawn) {
            pending.push_back((next_to_spawn, spawn_fetch(&fetcher, next_to_spawn)));
            next_to_spawn += 1;
        }

        let Some((height, slot)) = pending.pop_front() else {
            log::info!("✅ Block stream reached stop height");
            return;
        };

        let result = slot.into_result().await;

        let last_error = match result {
            Ok(FetchOutcome::Found(block)) => {
                if let Some(expected) = &last_hash {
                    if block.prev_hash() != expected || block.height() != height {
                        let err = SourceError::Gap {
                            height,
                            expected_prev_hash: expected.clone(),
                            actual_prev_hash: block.prev_hash().to_string(),
                        };
                        log::error!("❌ {}", err);
                        abort_all(&mut pending);
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                }
                backoff.reset();
                last_hash = Some(block.hash().to_string());
                if tx.send(Ok(block)).await.is_err() {
                    log::info!("Block stream consumer dropped, stopping producer");
                    abort_all(&mut pending);
                    return;
                }
                continue;
            }
            Ok(FetchOutcome::Skipped) => {
                log::debug!("Height {} skipped by chain", height);
                backoff.reset();
                continue;
            }
            Ok(FetchOutcome::NotFound) => None,
            Err(e) => Some(e.to_string()),
        };

        // Not past the head yet: wait for the chain instead of burning retries.
        let ahead_of_head = last_error.is_none()
            && matches!(fetcher.latest_height().await, Some(head) if height > head);

        if ahead_of_head {
            log::debug!("No new blocks at {}, throttling", height);
            tokio::time::sleep(throttle).await;
            pending.push_front((height, spawn_fetch(&fetcher, height)));
            continue;
        }

        if last_error.is_none() {
            let successor = linked_successor(
                &fetcher,
                &mut pending,
                &mut next_to_spawn,
                last_hash.as_deref(),
                within_stop,
            )
            .await;
            if let Some(successor) = successor {
                match &last_hash {
                    Some(_) => log::debug!(
                        "Heights {}..{} not produced by chain",
                        height,
                        successor
                    ),
                    None => log::warn!(
                        "⚠️  Start height {} not found, starting at {}",
                        height,
                        successor
                    ),
                }
                backoff.reset();
                continue;
            }
        }

        if backoff.sleep().await.is_err() {
            let err = SourceError::MissingBlock {
                height,
                attempts: backoff.attempts(),
                last_error,
            };
            log::error!("❌ {}", err);
            abort_all(&mut pending);
            let _ = tx.send(Err(err)).await;
            return;
        }

        pending.push_front((height, spawn_fetch(&fetcher, height)));
    }
}
