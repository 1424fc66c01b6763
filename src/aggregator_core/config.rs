//! Aggregator configuration from environment variables

use crate::streamer_core::ConfigError;
use std::env;
use std::time::Duration;

/// Adaptive batch cap: history is denser early on, so batches start small
/// and grow with the start position.
///
/// Parsed from `"<from_height>:<cap>,..."`, e.g. `"0:1000,100000000:5000"`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCap {
    // (from_height, cap), sorted by from_height
    tiers: Vec<(u64, u64)>,
}

impl BatchCap {
    pub fn fixed(cap: u64) -> Self {
        Self {
            tiers: vec![(0, cap)],
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut tiers = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (from, cap) = part
                .split_once(':')
                .ok_or_else(|| ConfigError::InvalidValue(format!("batch cap tier '{}'", part)))?;
            let from = from
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue(format!("batch cap tier '{}': {}", part, e)))?;
            let cap = cap
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue(format!("batch cap tier '{}': {}", part, e)))?;
            tiers.push((from, cap));
        }
        if tiers.is_empty() {
            return Err(ConfigError::InvalidValue("empty batch cap".to_string()));
        }
        tiers.sort_by_key(|(from, _)| *from);
        Ok(Self { tiers })
    }

    /// Cap for a batch starting at `start`. Below the first tier the first
    /// tier applies.
    pub fn cap_for(&self, start: u64) -> u64 {
        self.tiers
            .iter()
            .rev()
            .find(|(from, _)| *from <= start)
            .or_else(|| self.tiers.first())
            .map(|(_, cap)| *cap)
            .unwrap_or(0)
    }
}

/// Settings shared by every aggregate job, plus per-job batch caps.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub db_path: String,
    pub schema_dir: String,
    /// Block heights kept behind the latest ingested block.
    pub safety_lag: u64,
    /// First height to aggregate when a job has no watermark yet.
    pub genesis_height: u64,
    pub default_batch_cap: BatchCap,
    pub upsert_chunk_size: usize,
    pub idle_sleep: Duration,
    pub error_sleep: Duration,
    pub lease_ttl_secs: i64,
    pub worker_id: String,
    pub rpc_urls: Vec<String>,
    pub rpc_concurrency: usize,
    pub rpc_timeout_secs: u64,
    /// Retries per RPC call after the first attempt.
    pub rpc_max_retries: u32,
}

impl AggregatorConfig {
    /// Load configuration from environment variables
    ///
    /// - `NEARFLOW_DB_PATH`, `SCHEMA_DIR`
    /// - `SAFETY_LAG` (default 5), `GENESIS_HEIGHT` (default 0)
    /// - `BATCH_CAP_TIERS` (default `0:1000`), per job `BATCH_CAP_TIERS_<JOB>`
    /// - `UPSERT_CHUNK_SIZE` (100), `IDLE_SLEEP_MS` (1000), `ERROR_SLEEP_MS` (5000)
    /// - `LEASE_TTL_SECS` (60), `WORKER_ID` (hostname-pid)
    /// - `RPC_URLS` (comma separated), `RPC_CONCURRENCY` (8), `RPC_MAX_RETRIES` (4)
    pub fn from_env() -> Result<Self, ConfigError> {
        let default_batch_cap = match env::var("BATCH_CAP_TIERS") {
            Ok(raw) => BatchCap::parse(&raw)?,
            Err(_) => BatchCap::fixed(1_000),
        };

        let rpc_urls: Vec<String> = env::var("RPC_URLS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(bad) = rpc_urls
            .iter()
            .find(|u| !u.starts_with("http://") && !u.starts_with("https://"))
        {
            return Err(ConfigError::InvalidValue(format!("RPC url '{}'", bad)));
        }

        let worker_id = env::var("WORKER_ID").unwrap_or_else(|_| {
            let host = env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
            format!("{}-{}", host, std::process::id())
        });

        Ok(Self {
            db_path: env::var("NEARFLOW_DB_PATH")
                .unwrap_or_else(|_| "/var/lib/nearflow/nearflow.db".to_string()),
            schema_dir: env::var("SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string()),
            safety_lag: env::var("SAFETY_LAG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            genesis_height: env::var("GENESIS_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            default_batch_cap,
            upsert_chunk_size: env::var("UPSERT_CHUNK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100usize)
                .max(1),
            idle_sleep: Duration::from_millis(
                env::var("IDLE_SLEEP_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1_000),
            ),
            error_sleep: Duration::from_millis(
                env::var("ERROR_SLEEP_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5_000),
            ),
            lease_ttl_secs: env::var("LEASE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            worker_id,
            rpc_urls,
            rpc_concurrency: env::var("RPC_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8usize)
                .max(1),
            rpc_timeout_secs: env::var("RPC_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            rpc_max_retries: env::var("RPC_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
        })
    }

    /// `BATCH_CAP_TIERS_<JOB>` if set, else the shared cap.
    pub fn batch_cap_for(&self, job: &str) -> Result<BatchCap, ConfigError> {
        match env::var(format!("BATCH_CAP_TIERS_{}", job.to_uppercase())) {
            Ok(raw) => BatchCap::parse(&raw),
            Err(_) => Ok(self.default_batch_cap.clone()),
        }
    }

    /// Config for tests and embedded runs.
    pub fn local(db_path: &str) -> Self {
        Self {
            db_path: db_path.to_string(),
            schema_dir: "sql".to_string(),
            safety_lag: 0,
            genesis_height: 0,
            default_batch_cap: BatchCap::fixed(1_000),
            upsert_chunk_size: 100,
            idle_sleep: Duration::from_millis(10),
            error_sleep: Duration::from_millis(10),
            lease_ttl_secs: 60,
            worker_id: "local".to_string(),
            rpc_urls: Vec::new(),
            rpc_concurrency: 4,
            rpc_timeout_secs: 5,
            rpc_max_retries: 1,
        }
    }
}
