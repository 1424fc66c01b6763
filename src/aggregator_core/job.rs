//! Per-job state machine: Idle → Compute → Guard → Aggregate → Persist, with
//! Error and Sleep as the only ways out of an iteration.

use crate::aggregator_core::config::{AggregatorConfig, BatchCap};
use crate::aggregator_core::error::AggregateError;
use crate::aggregator_core::reporter::ErrorReporter;
use crate::aggregator_core::watermark::{
    claim_lease, read_watermark, release_lease, write_watermark, Watermark,
};
use crate::streamer_core::ConfigError;
use async_trait::async_trait;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// One derived table kept in sync with the event store.
#[async_trait]
pub trait AggregateJob: Send + Sync {
    type Delta: Send + Sync;

    /// Watermark key and lease key.
    fn name(&self) -> &'static str;

    /// Latest position available to aggregate, `None` while the source is empty.
    fn latest_position(&self, conn: &Connection) -> Result<Option<u64>, AggregateError>;

    /// Grouped read over the inclusive range `[start, end]`.
    fn aggregate(&self, conn: &Connection, start: u64, end: u64) -> Result<Vec<Self::Delta>, AggregateError>;

    /// Async enrichment between aggregate and persist (e.g. RPC lookups).
    async fn enrich(&self, deltas: Vec<Self::Delta>) -> Result<Vec<Self::Delta>, AggregateError> {
        Ok(deltas)
    }

    /// Upsert `deltas` in chunks of `chunk_size`. Runs inside the watermark
    /// transaction. Returns rows written.
    fn persist(
        &self,
        tx: &Transaction,
        deltas: &[Self::Delta],
        chunk_size: usize,
    ) -> Result<usize, AggregateError>;

    /// Value stored in the watermark `index` after processing up to `end`.
    fn index_after(&self, _conn: &Connection, _end: u64) -> Result<Option<String>, AggregateError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRange {
    pub start: u64,
    pub end: u64,
    /// `latest - safety_lag` at compute time.
    pub safe_head: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Processed { start: u64, end: u64, rows: usize },
    NoNewData,
    /// Another worker holds the job lease.
    Skipped,
    Failed(String),
}

pub enum JobState<D> {
    Idle,
    Compute {
        watermark: Option<Watermark>,
    },
    Guard {
        watermark: Option<Watermark>,
        range: BatchRange,
    },
    Aggregate {
        watermark: Option<Watermark>,
        range: BatchRange,
    },
    Persist {
        watermark: Option<Watermark>,
        range: BatchRange,
        deltas: Vec<D>,
    },
    Error(AggregateError),
    Sleep {
        outcome: IterationOutcome,
        delay: Duration,
    },
}

impl<D> JobState<D> {
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Compute { .. } => "compute",
            JobState::Guard { .. } => "guard",
            JobState::Aggregate { .. } => "aggregate",
            JobState::Persist { .. } => "persist",
            JobState::Error(_) => "error",
            JobState::Sleep { .. } => "sleep",
        }
    }
}

pub struct JobRunner<J: AggregateJob> {
    job: J,
    conn: Connection,
    config: AggregatorConfig,
    batch_cap: BatchCap,
    reporter: Arc<dyn ErrorReporter>,
}

impl<J: AggregateJob> JobRunner<J> {
    pub fn new(
        job: J,
        conn: Connection,
        config: AggregatorConfig,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self, ConfigError> {
        let batch_cap = config.batch_cap_for(job.name())?;
        Ok(Self {
            job,
            conn,
            config,
            batch_cap,
            reporter,
        })
    }

    pub fn with_batch_cap(mut self, batch_cap: BatchCap) -> Self {
        self.batch_cap = batch_cap;
        self
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Drive one iteration from Idle to Sleep. Does not sleep itself.
    pub async fn run_iteration(&mut self) -> (IterationOutcome, Duration) {
        let mut state = JobState::Idle;
        loop {
            state = match state {
                JobState::Sleep { outcome, delay } => return (outcome, delay),
                other => self.step(other).await,
            };
        }
    }

    /// Loop until `shutdown` turns true or its sender goes away. Errors are
    /// reported and retried; the job never exits on its own. An iteration in
    /// progress finishes first, then the lease is released so a restarted
    /// worker can claim the job without waiting out the TTL.
    pub async fn run_until(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "🚀 [{}] Aggregate job started (worker: {}, safety lag: {})",
            self.job.name(),
            self.config.worker_id,
            self.config.safety_lag
        );
        while !*shutdown.borrow() {
            let (outcome, delay) = self.run_iteration().await;
            match &outcome {
                IterationOutcome::Processed { start, end, rows } => log::info!(
                    "✅ [{}] Processed [{}, {}] ({} rows)",
                    self.job.name(),
                    start,
                    end,
                    rows
                ),
                IterationOutcome::NoNewData => log::debug!("[{}] No new data", self.job.name()),
                IterationOutcome::Skipped => {
                    log::debug!("[{}] Lease held by another worker", self.job.name())
                }
                IterationOutcome::Failed(_) => {}
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        self.release();
    }

    /// Drop this worker's lease on the job. A lease held by someone else is
    /// left alone.
    pub fn release(&self) {
        match release_lease(&self.conn, self.job.name(), &self.config.worker_id) {
            Ok(()) => log::info!("🔓 [{}] Lease released", self.job.name()),
            Err(e) => log::warn!("⚠️  [{}] Failed to release lease: {}", self.job.name(), e),
        }
    }

    async fn step(&mut self, state: JobState<J::Delta>) -> JobState<J::Delta> {
        match state {
            JobState::Idle => self.idle(),
            JobState::Compute { watermark } => self.compute(watermark),
            JobState::Guard { watermark, range } => self.guard(watermark, range),
            JobState::Aggregate { watermark, range } => self.aggregate(watermark, range).await,
            JobState::Persist {
                watermark,
                range,
                deltas,
            } => self.persist(watermark, range, deltas),
            JobState::Error(error) => {
                self.reporter.report(self.job.name(), &error);
                JobState::Sleep {
                    outcome: IterationOutcome::Failed(error.to_string()),
                    delay: self.config.error_sleep,
                }
            }
            sleep @ JobState::Sleep { .. } => sleep,
        }
    }

    fn idle(&mut self) -> JobState<J::Delta> {
        let now = chrono::Utc::now().timestamp();
        let claimed = match claim_lease(
            &self.conn,
            self.job.name(),
            &self.config.worker_id,
            now,
            self.config.lease_ttl_secs,
        ) {
            Ok(claimed) => claimed,
            Err(e) => return JobState::Error(e),
        };
        if !claimed {
            return JobState::Sleep {
                outcome: IterationOutcome::Skipped,
                delay: self.config.idle_sleep,
            };
        }

        match read_watermark(&self.conn, self.job.name()) {
            Ok(watermark) => JobState::Compute { watermark },
            Err(e) => JobState::Error(e),
        }
    }

    fn compute(&mut self, watermark: Option<Watermark>) -> JobState<J::Delta> {
        let start = match &watermark {
            Some(wm) => wm.sync + 1,
            None => self.config.genesis_height,
        };
        let latest = match self.job.latest_position(&self.conn) {
            Ok(Some(latest)) => latest,
            Ok(None) => return self.no_new_data(),
            Err(e) => return JobState::Error(e),
        };
        if latest < self.config.safety_lag {
            return self.no_new_data();
        }
        let safe_head = latest - self.config.safety_lag;
        JobState::Guard {
            watermark,
            range: BatchRange {
                start,
                end: safe_head,
                safe_head,
            },
        }
    }

    fn guard(&mut self, watermark: Option<Watermark>, mut range: BatchRange) -> JobState<J::Delta> {
        if range.end < range.start {
            return self.no_new_data();
        }
        let cap = self.batch_cap.cap_for(range.start);
        if range.end - range.start > cap {
            range.end = range.start + cap;
        }
        JobState::Aggregate { watermark, range }
    }

    async fn aggregate(&mut self, watermark: Option<Watermark>, range: BatchRange) -> JobState<J::Delta> {
        let deltas = match self.job.aggregate(&self.conn, range.start, range.end) {
            Ok(deltas) => deltas,
            Err(e) => return JobState::Error(e),
        };
        match self.job.enrich(deltas).await {
            Ok(deltas) => JobState::Persist {
                watermark,
                range,
                deltas,
            },
            Err(e) => JobState::Error(e),
        }
    }

    fn persist(
        &mut self,
        watermark: Option<Watermark>,
        range: BatchRange,
        deltas: Vec<J::Delta>,
    ) -> JobState<J::Delta> {
        match self.persist_atomically(watermark.as_ref(), range, &deltas) {
            Ok(rows) => JobState::Sleep {
                outcome: IterationOutcome::Processed {
                    start: range.start,
                    end: range.end,
                    rows,
                },
                delay: Duration::ZERO,
            },
            Err(e) => JobState::Error(e),
        }
    }

    fn persist_atomically(
        &mut self,
        expected: Option<&Watermark>,
        range: BatchRange,
        deltas: &[J::Delta],
    ) -> Result<usize, AggregateError> {
        let name = self.job.name();
        let chunk_size = self.config.upsert_chunk_size;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = read_watermark(&tx, name)?;
        if current.as_ref().map(|w| w.sync) != expected.map(|w| w.sync) {
            return Err(AggregateError::WatermarkConflict {
                key: name.to_string(),
                expected: expected.map(|w| w.sync),
                found: current.map(|w| w.sync),
            });
        }

        let rows = self.job.persist(&tx, deltas, chunk_size)?;
        let index = match self.job.index_after(&tx, range.end)? {
            Some(index) => Some(index),
            None => expected.and_then(|w| w.index.clone()),
        };
        write_watermark(
            &tx,
            name,
            &Watermark {
                sync: range.end,
                finished: range.end == range.safe_head,
                index,
            },
        )?;
        tx.commit()?;
        Ok(rows)
    }

    fn no_new_data(&self) -> JobState<J::Delta> {
        JobState::Sleep {
            outcome: IterationOutcome::NoNewData,
            delay: self.config.idle_sleep,
        }
    }
}
