use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Capped exponential backoff with full jitter, in milliseconds.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    pub fn new(initial_ms: u64, max_ms: u64, retries: u32) -> Self {
        Self {
            initial_delay_ms: initial_ms,
            max_delay_ms: max_ms,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }

    /// Upper bound of the delay for the current attempt, before jitter.
    pub fn ceiling_ms(&self) -> u64 {
        let factor = 2_u64.checked_pow(self.current_attempt).unwrap_or(u64::MAX);
        std::cmp::min(self.initial_delay_ms.saturating_mul(factor), self.max_delay_ms)
    }

    /// Next delay: uniform in `[ceiling/2, ceiling]`.
    pub fn next_delay(&mut self) -> Result<Duration, MaxRetriesExceeded> {
        if self.current_attempt >= self.max_retries {
            return Err(MaxRetriesExceeded);
        }

        let ceiling = self.ceiling_ms();
        let delay = if ceiling == 0 {
            0
        } else {
            rand::thread_rng().gen_range(ceiling / 2..=ceiling)
        };
        self.current_attempt += 1;
        Ok(Duration::from_millis(delay))
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        let delay = self.next_delay()?;

        log::warn!(
            "⏳ Retry attempt {} of {} in {}ms",
            self.current_attempt,
            self.max_retries,
            delay.as_millis()
        );

        sleep(delay).await;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// Run `op` until it succeeds or `backoff` is exhausted. Returns the last
/// error once retries run out.
pub async fn retry_with_backoff<T, E, F, Fut>(
    mut backoff: ExponentialBackoff,
    what: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::warn!("⚠️  {} failed: {}", what, e);
                if backoff.sleep().await.is_err() {
                    log::error!("❌ {} gave up after {} attempts", what, backoff.attempts());
                    return Err(e);
                }
            }
        }
    }
}
