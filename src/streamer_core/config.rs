use std::env;
use std::path::PathBuf;

/// Primary tier for block fetches. The other configured tiers act as fallbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendType {
    ObjectStore,
    LiveFeed,
}

impl BackendType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "object_store" | "s3" => Some(BackendType::ObjectStore),
            "live_feed" | "neardata" => Some(BackendType::LiveFeed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub backend: BackendType,
    pub object_store_url: Option<String>,
    pub live_feed_url: Option<String>,
    /// Packaged historical archive; also the write-back target.
    pub archive_dir: Option<PathBuf>,
    pub archive_write_back: bool,
    pub start_height: u64,
    pub stop_height: Option<u64>,
    pub prefetch_pool_size: usize,
    pub buffer_size: usize,
    pub cache_capacity: usize,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    pub max_retries: u32,
    pub no_new_blocks_throttle_ms: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn http_url(name: &str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(url) if url.starts_with("http://") || url.starts_with("https://") => {
            Ok(Some(url.trim_end_matches('/').to_string()))
        }
        Ok(_) => Err(ConfigError::InvalidValue(format!(
            "{} must start with http:// or https://",
            name
        ))),
        Err(_) => Ok(None),
    }
}

impl SourceConfig {
    /// Load from environment variables.
    ///
    /// - `BLOCK_SOURCE` (object_store | live_feed, default object_store)
    /// - `OBJECT_STORE_URL`, `LIVE_FEED_URL`, `ARCHIVE_DIR`
    /// - `START_HEIGHT` (required), `STOP_HEIGHT`
    /// - `PREFETCH_POOL_SIZE` (8), `BLOCK_BUFFER_SIZE` (32), `BLOCK_CACHE_CAPACITY` (256)
    /// - `FETCH_RETRY_INITIAL_MS` (200), `FETCH_RETRY_MAX_MS` (10000), `FETCH_MAX_RETRIES` (8)
    /// - `NO_NEW_BLOCKS_THROTTLE_MS` (700), `ARCHIVE_WRITE_BACK` (false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend_str = env::var("BLOCK_SOURCE").unwrap_or_else(|_| "object_store".to_string());
        let backend = BackendType::parse(&backend_str).ok_or_else(|| {
            ConfigError::InvalidValue(format!("unknown BLOCK_SOURCE '{}'", backend_str))
        })?;

        let object_store_url = http_url("OBJECT_STORE_URL")?;
        let live_feed_url = http_url("LIVE_FEED_URL")?;

        match backend {
            BackendType::ObjectStore if object_store_url.is_none() => {
                return Err(ConfigError::MissingVariable("OBJECT_STORE_URL".to_string()))
            }
            BackendType::LiveFeed if live_feed_url.is_none() => {
                return Err(ConfigError::MissingVariable("LIVE_FEED_URL".to_string()))
            }
            _ => {}
        }

        let start_height = env::var("START_HEIGHT")
            .map_err(|_| ConfigError::MissingVariable("START_HEIGHT".to_string()))?
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(format!("START_HEIGHT: {}", e)))?;

        let stop_height = env::var("STOP_HEIGHT").ok().and_then(|s| s.parse().ok());

        let prefetch_pool_size = parse_or("PREFETCH_POOL_SIZE", 8usize);
        if prefetch_pool_size == 0 {
            return Err(ConfigError::InvalidValue(
                "PREFETCH_POOL_SIZE must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            backend,
            object_store_url,
            live_feed_url,
            archive_dir: env::var("ARCHIVE_DIR").ok().map(PathBuf::from),
            archive_write_back: parse_or("ARCHIVE_WRITE_BACK", false),
            start_height,
            stop_height,
            prefetch_pool_size,
            buffer_size: parse_or("BLOCK_BUFFER_SIZE", 32usize).max(1),
            cache_capacity: parse_or("BLOCK_CACHE_CAPACITY", 256usize),
            retry_initial_ms: parse_or("FETCH_RETRY_INITIAL_MS", 200u64),
            retry_max_ms: parse_or("FETCH_RETRY_MAX_MS", 10_000u64),
            max_retries: parse_or("FETCH_MAX_RETRIES", 8u32),
            no_new_blocks_throttle_ms: parse_or("NO_NEW_BLOCKS_THROTTLE_MS", 700u64),
            request_timeout_secs: parse_or("FETCH_TIMEOUT_SECS", 30u64),
        })
    }

    /// Config for tests and embedded use: no network tiers, tight retry settings.
    pub fn local(start_height: u64) -> Self {
        Self {
            backend: BackendType::ObjectStore,
            object_store_url: None,
            live_feed_url: None,
            archive_dir: None,
            archive_write_back: false,
            start_height,
            stop_height: None,
            prefetch_pool_size: 4,
            buffer_size: 8,
            cache_capacity: 64,
            retry_initial_ms: 1,
            retry_max_ms: 5,
            max_retries: 3,
            no_new_blocks_throttle_ms: 5,
            request_timeout_secs: 5,
        }
    }
}
