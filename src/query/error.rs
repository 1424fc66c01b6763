#[derive(Debug)]
pub enum QueryError {
    /// Cursor token could not be decoded (client error).
    InvalidCursor(String),
    /// Bad or conflicting parameters (client error).
    InvalidParams(String),
    Database(String),
}

impl QueryError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, QueryError::InvalidCursor(_) | QueryError::InvalidParams(_))
    }
}

impl From<rusqlite::Error> for QueryError {
    fn from(err: rusqlite::Error) -> Self {
        QueryError::Database(err.to_string())
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::InvalidCursor(e) => write!(f, "Invalid cursor: {}", e),
            QueryError::InvalidParams(e) => write!(f, "Invalid parameters: {}", e),
            QueryError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for QueryError {}
