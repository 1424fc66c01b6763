//! Store side of ingestion: schema, event writer and the ingestion loop.

pub mod config;
pub mod db;
pub mod ingestion;
pub mod sqlite_writer;
pub mod writer_backend;

pub use config::PipelineConfig;
pub use db::{ingestion_checkpoint, open_store, run_schema_migrations};
pub use ingestion::{run_ingestion, IngestionError, IngestionStats};
pub use sqlite_writer::SqliteWriter;
pub use writer_backend::{WriterBackend, WriterError};
