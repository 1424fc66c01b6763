//! Ingestion runtime configuration from environment variables

use std::env;

/// Configuration for the ingestion runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Directory holding the `.sql` migration files
    pub schema_dir: String,

    /// Blocks buffered per database flush
    pub flush_batch_blocks: usize,

    /// Rows per multi-row insert statement
    pub decode_chunk_size: usize,

    /// Flush interval in milliseconds
    pub flush_interval_ms: u64,

    /// How often source metrics are logged, in seconds
    pub metrics_log_interval_secs: u64,
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `NEARFLOW_DB_PATH` (default: /var/lib/nearflow/nearflow.db)
    /// - `SCHEMA_DIR` (default: sql)
    /// - `FLUSH_BATCH_BLOCKS` (default: 100)
    /// - `DECODE_CHUNK_SIZE` (default: 100)
    /// - `INGEST_FLUSH_INTERVAL_MS` (default: 2000)
    /// - `METRICS_LOG_INTERVAL_SECS` (default: 60)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("NEARFLOW_DB_PATH")
                .unwrap_or_else(|_| "/var/lib/nearflow/nearflow.db".to_string()),

            schema_dir: env::var("SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string()),

            flush_batch_blocks: env::var("FLUSH_BATCH_BLOCKS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),

            decode_chunk_size: env::var("DECODE_CHUNK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),

            flush_interval_ms: env::var("INGEST_FLUSH_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2_000),

            metrics_log_interval_secs: env::var("METRICS_LOG_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_from_env() {
        // Defaults first, then overrides; env is process-global so one test.
        env::remove_var("SCHEMA_DIR");
        env::remove_var("DECODE_CHUNK_SIZE");
        env::remove_var("INGEST_FLUSH_INTERVAL_MS");

        let config = PipelineConfig::from_env();
        assert_eq!(config.schema_dir, "sql");
        assert_eq!(config.decode_chunk_size, 100);
        assert_eq!(config.flush_interval_ms, 2_000);

        env::set_var("SCHEMA_DIR", "/opt/nearflow/sql");
        env::set_var("DECODE_CHUNK_SIZE", "250");
        env::set_var("INGEST_FLUSH_INTERVAL_MS", "not-a-number");

        let config = PipelineConfig::from_env();
        assert_eq!(config.schema_dir, "/opt/nearflow/sql");
        assert_eq!(config.decode_chunk_size, 250);
        assert_eq!(config.flush_interval_ms, 2_000);

        env::remove_var("SCHEMA_DIR");
        env::remove_var("DECODE_CHUNK_SIZE");
        env::remove_var("INGEST_FLUSH_INTERVAL_MS");
    }
}
