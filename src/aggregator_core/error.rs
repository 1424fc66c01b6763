#[derive(Debug)]
pub enum AggregateError {
    Database(String),
    Serialization(serde_json::Error),
    Rpc(String),
    /// The watermark moved between read and write; another worker advanced it.
    WatermarkConflict { key: String, expected: Option<u64>, found: Option<u64> },
    InvalidData(String),
}

impl From<rusqlite::Error> for AggregateError {
    fn from(err: rusqlite::Error) -> Self {
        AggregateError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AggregateError {
    fn from(err: serde_json::Error) -> Self {
        AggregateError::Serialization(err)
    }
}

impl From<reqwest::Error> for AggregateError {
    fn from(err: reqwest::Error) -> Self {
        AggregateError::Rpc(err.to_string())
    }
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateError::Database(e) => write!(f, "Database error: {}", e),
            AggregateError::Serialization(e) => write!(f, "Serialization error: {}", e),
            AggregateError::Rpc(e) => write!(f, "RPC error: {}", e),
            AggregateError::WatermarkConflict { key, expected, found } => write!(
                f,
                "Watermark {} moved from {:?} to {:?} during iteration",
                key, expected, found
            ),
            AggregateError::InvalidData(e) => write!(f, "Invalid data: {}", e),
        }
    }
}

impl std::error::Error for AggregateError {}

/// Parse a decimal TEXT amount column.
pub fn parse_stored_amount(raw: &str) -> Result<i128, AggregateError> {
    raw.parse::<i128>()
        .map_err(|e| AggregateError::InvalidData(format!("amount '{}': {}", raw, e)))
}

/// Parse an unsigned accumulated TEXT column (volumes), which may exceed
/// the signed amount range.
pub fn parse_stored_volume(raw: &str) -> Result<u128, AggregateError> {
    raw.parse::<u128>()
        .map_err(|e| AggregateError::InvalidData(format!("volume '{}': {}", raw, e)))
}
