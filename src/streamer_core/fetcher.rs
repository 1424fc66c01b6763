use crate::streamer_core::types::BlockMessage;
use async_trait::async_trait;

/// Result of asking one tier for one height.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(BlockMessage),
    /// The chain produced no block at this height.
    Skipped,
    /// The tier does not have this height (yet).
    NotFound,
}

#[derive(Debug)]
pub enum FetchError {
    Http(String),
    Io(std::io::Error),
    Decode(serde_json::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(err.to_string())
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err)
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Http(e) => write!(f, "HTTP error: {}", e),
            FetchError::Io(e) => write!(f, "IO error: {}", e),
            FetchError::Decode(e) => write!(f, "Block decode error: {}", e),
        }
    }
}

impl std::error::Error for FetchError {}

/// One storage tier of the block source.
#[async_trait]
pub trait BlockFetcher: Send + Sync {
    /// Tier name used for metrics labels and logs.
    fn tier(&self) -> &'static str;

    async fn fetch(&self, height: u64) -> Result<FetchOutcome, FetchError>;

    /// Latest height this tier knows about, if it can tell.
    async fn latest_height(&self) -> Result<Option<u64>, FetchError> {
        Ok(None)
    }
}
