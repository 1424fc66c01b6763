//! Block source metrics: fetch attempts per tier and outcome, per-tier
//! latency, cache size and in-flight dedup joins.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FetchLabels {
    pub tier: String,
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TierLabels {
    pub tier: String,
}

type LatencyFamily = Family<TierLabels, Histogram, fn() -> Histogram>;

fn latency_histogram() -> Histogram {
    // 5ms to ~20s
    Histogram::new(exponential_buckets(0.005, 2.0, 12))
}

#[derive(Clone)]
pub struct SourceMetrics {
    pub fetch_attempts: Family<FetchLabels, Counter>,
    pub fetch_latency_seconds: LatencyFamily,
    pub cache_size: Gauge,
    pub dedup_joins: Counter,
}

impl Default for SourceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceMetrics {
    pub fn new() -> Self {
        Self {
            fetch_attempts: Family::default(),
            fetch_latency_seconds: Family::new_with_constructor(
                latency_histogram as fn() -> Histogram,
            ),
            cache_size: Gauge::default(),
            dedup_joins: Counter::default(),
        }
    }

    pub fn record_fetch(&self, tier: &str, outcome: &str, latency_secs: f64) {
        self.fetch_attempts
            .get_or_create(&FetchLabels {
                tier: tier.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
        self.fetch_latency_seconds
            .get_or_create(&TierLabels {
                tier: tier.to_string(),
            })
            .observe(latency_secs);
    }

    pub fn record_cache_hit(&self) {
        self.fetch_attempts
            .get_or_create(&FetchLabels {
                tier: "cache".to_string(),
                outcome: "hit".to_string(),
            })
            .inc();
    }

    #[inline]
    pub fn set_cache_size(&self, size: usize) {
        self.cache_size.set(size as i64);
    }

    #[inline]
    pub fn record_dedup_join(&self) {
        self.dedup_joins.inc();
    }

    pub fn fetch_count(&self, tier: &str, outcome: &str) -> u64 {
        self.fetch_attempts
            .get_or_create(&FetchLabels {
                tier: tier.to_string(),
                outcome: outcome.to_string(),
            })
            .get()
    }

    /// Text exposition of these metrics alone.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut registry = Registry::default();
        self.register(&mut registry);
        encode_registry(&registry)
    }

    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "nearflow_block_fetch_attempts",
            "Block fetch attempts by source tier and outcome",
            self.fetch_attempts.clone(),
        );
        registry.register(
            "nearflow_block_fetch_latency_seconds",
            "Block fetch latency per source tier",
            self.fetch_latency_seconds.clone(),
        );
        registry.register(
            "nearflow_block_cache_size",
            "Blocks currently held in the in-memory cache",
            self.cache_size.clone(),
        );
        registry.register(
            "nearflow_block_fetch_dedup_joins",
            "Fetches that attached to an in-flight request for the same height",
            self.dedup_joins.clone(),
        );
    }
}

/// Render a registry in the Prometheus text format.
pub fn encode_registry(registry: &Registry) -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    encode(&mut buffer, registry)?;
    Ok(buffer)
}
