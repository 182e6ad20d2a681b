use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::cancel::{sleep_or_cancel, CancellationSignal};
use crate::source::SourceError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 1_000, max_delay_ms: 30_000 }
    }
}

impl RetryPolicy {
    /// Retries without sleeping; used by tests and dry runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    /// Delay before retry number `retry` (zero-based), doubling up to the cap.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Per-call retry bookkeeping. Created fresh for every logical fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetrievalState {
    pub attempt_count: u32,
    pub next_delay: Duration,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("recommendation fetch cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
    #[error("recommendation fetch still throttled after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: SourceError },
    #[error("recommendation fetch failed after {attempts} attempt(s): {source}")]
    Failed {
        attempts: u32,
        #[source]
        source: SourceError,
    },
}

impl RetrievalError {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Cancelled { attempts }
            | Self::Exhausted { attempts, .. }
            | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Runs provider fetches with bounded exponential backoff on throttling.
#[derive(Clone, Debug, Default)]
pub struct RateLimitedRetriever {
    policy: RetryPolicy,
}

impl RateLimitedRetriever {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn with_retry<T, F, Fut>(
        &self,
        signal: &CancellationSignal,
        mut operation: F,
    ) -> Result<T, RetrievalError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut state = RetrievalState::default();

        loop {
            if signal.is_cancelled() {
                return Err(RetrievalError::Cancelled { attempts: state.attempt_count });
            }

            state.attempt_count += 1;
            let error = match operation().await {
                Ok(value) => {
                    if state.attempt_count > 1 {
                        debug!(attempts = state.attempt_count, "fetch succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_throttling() {
                return Err(RetrievalError::Failed { attempts: state.attempt_count, source: error });
            }

            let retries_used = state.attempt_count - 1;
            if retries_used >= self.policy.max_retries {
                warn!(
                    event_name = "pipeline.retrieval.exhausted",
                    attempts = state.attempt_count,
                    max_retries = self.policy.max_retries,
                    error = %error,
                    "throttling persisted past retry budget"
                );
                return Err(RetrievalError::Exhausted {
                    attempts: state.attempt_count,
                    last_error: error,
                });
            }

            state.next_delay = self.policy.backoff(retries_used);
            warn!(
                event_name = "pipeline.retrieval.throttled",
                attempt = state.attempt_count,
                max_retries = self.policy.max_retries,
                delay_ms = state.next_delay.as_millis() as u64,
                error = %error,
                "fetch throttled; backing off"
            );

            if sleep_or_cancel(state.next_delay, signal).await.is_err() {
                return Err(RetrievalError::Cancelled { attempts: state.attempt_count });
            }
        }
    }
}
