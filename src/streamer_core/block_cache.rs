//! Bounded in-memory block cache with in-flight request deduplication.
//!
//! A second caller asking for a height that is already being fetched waits on
//! the first caller's result instead of issuing its own request.

use crate::streamer_core::fetcher::{FetchError, FetchOutcome};
use crate::streamer_core::metrics::SourceMetrics;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<FetchOutcome>>;

struct Entries {
    outcomes: HashMap<u64, FetchOutcome>,
    // insertion order, oldest first
    order: VecDeque<u64>,
}

pub struct BlockCache {
    capacity: usize,
    entries: Mutex<Entries>,
    in_flight: Mutex<HashMap<u64, Slot>>,
    metrics: SourceMetrics,
}

/// Removes the in-flight slot when the owning fetch finishes or is cancelled.
struct InFlightGuard<'a> {
    cache: &'a BlockCache,
    height: u64,
    slot: Slot,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.cache.in_flight.lock() {
            if let Some(current) = in_flight.get(&self.height) {
                if Arc::ptr_eq(current, &self.slot) {
                    in_flight.remove(&self.height);
                }
            }
        }
    }
}

impl BlockCache {
    pub fn new(capacity: usize, metrics: SourceMetrics) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Entries {
                outcomes: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            in_flight: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.outcomes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, height: u64) -> Option<FetchOutcome> {
        self.entries
            .lock()
            .ok()
            .and_then(|e| e.outcomes.get(&height).cloned())
    }

    /// Cache a definitive answer. `NotFound` is never cached.
    pub fn insert(&self, height: u64, outcome: FetchOutcome) {
        if self.capacity == 0 || outcome == FetchOutcome::NotFound {
            return;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.outcomes.insert(height, outcome).is_none() {
            entries.order.push_back(height);
        }
        while entries.outcomes.len() > self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.outcomes.remove(&oldest);
                }
                None => break,
            }
        }
        self.metrics.set_cache_size(entries.outcomes.len());
    }

    /// Return the cached outcome for `height`, or run `fetch` once for all
    /// concurrent callers of the same height.
    pub async fn get_or_fetch<F, Fut>(&self, height: u64, fetch: F) -> Result<FetchOutcome, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchOutcome, FetchError>>,
    {
        if let Some(hit) = self.get(height) {
            self.metrics.record_cache_hit();
            return Ok(hit);
        }

        let slot = {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| FetchError::Http("block cache lock poisoned".to_string()))?;
            match in_flight.get(&height) {
                Some(existing) => {
                    self.metrics.record_dedup_join();
                    existing.clone()
                }
                None => {
                    let slot: Slot = Arc::new(OnceCell::new());
                    in_flight.insert(height, slot.clone());
                    slot
                }
            }
        };

        let guard = InFlightGuard {
            cache: self,
            height,
            slot: slot.clone(),
        };

        let outcome = slot.get_or_try_init(fetch).await?.clone();
        drop(guard);

        self.insert(height, outcome.clone());
        Ok(outcome)
    }
}
