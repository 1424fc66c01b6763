//! Aggregator Core - watermark-driven incremental aggregates
//!
//! Each job re-reads the event store in bounded height ranges and merges the
//! result into its derived table. Progress lives in `settings` and is written
//! in the same transaction as the rows it covers.
//!
//! # Architecture
//!
//! ```text
//! settings (watermark) ─┐
//! blocks / ft_events ───┴→ JobRunner<J: AggregateJob>
//!                              ├─ aggregate [start, end]
//!                              ├─ enrich (RpcPool for balance snapshots)
//!                              └─ persist rows + watermark, one transaction
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod jobs;
pub mod reporter;
pub mod rpc_pool;
pub mod watermark;

pub use config::{AggregatorConfig, BatchCap};
pub use error::AggregateError;
pub use job::{AggregateJob, BatchRange, IterationOutcome, JobRunner, JobState};
pub use reporter::{ErrorReporter, LogReporter};
pub use rpc_pool::{BalanceSource, RpcPool};
pub use watermark::Watermark;
