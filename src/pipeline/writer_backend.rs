use crate::decoder::CanonicalEvent;
use crate::streamer_core::BlockMessage;
use async_trait::async_trait;

/// Errors from persisting decoded blocks.
#[derive(Debug)]
pub enum WriterError {
    /// Store could not be opened or migrated.
    Schema(String),
    Database(String),
    /// A replayed height arrived with a different hash than the stored one.
    Fork {
        height: u64,
        stored: String,
        incoming: String,
    },
}

impl From<rusqlite::Error> for WriterError {
    fn from(err: rusqlite::Error) -> Self {
        WriterError::Database(err.to_string())
    }
}

impl std::fmt::Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterError::Schema(e) => write!(f, "Store setup failed: {}", e),
            WriterError::Database(e) => write!(f, "Database error: {}", e),
            WriterError::Fork {
                height,
                stored,
                incoming,
            } => write!(
                f,
                "Block {} already stored as {}, refusing {}",
                height, stored, incoming
            ),
        }
    }
}

impl std::error::Error for WriterError {}

#[async_trait]
pub trait WriterBackend: Send {
    /// Queue one decoded block and its events
    async fn write_block(
        &mut self,
        block: &BlockMessage,
        events: Vec<CanonicalEvent>,
    ) -> Result<(), WriterError>;

    /// Flush pending writes to storage
    async fn flush(&mut self) -> Result<(), WriterError>;

    /// Blocks queued but not yet flushed
    fn pending_blocks(&self) -> usize;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
