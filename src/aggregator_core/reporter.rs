use crate::aggregator_core::error::AggregateError;

/// Sink for aggregator iteration failures (error tracker seam).
pub trait ErrorReporter: Send + Sync {
    fn report(&self, job: &str, error: &AggregateError);
}

/// Reports through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, job: &str, error: &AggregateError) {
        log::error!("❌ [{}] Aggregation iteration failed: {}", job, error);
    }
}
