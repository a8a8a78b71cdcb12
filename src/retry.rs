use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles the delay each time)
    pub backoff_multiplier: f64,
    /// Overall budget for one call, measured from the first attempt
    pub deadline: Option<Duration>,
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            deadline: None,
        }
    }

    /// Set the maximum delay between retries
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Give up once the next backoff would overrun this budget
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Preset: SPARQL endpoint queries (5 attempts)
    /// Delays: 2, 4, 8, 16 units = 30 units total wait time
    pub fn sparql_query(unit: Duration) -> Self {
        Self::new(5, unit * 2)
            .with_max_delay(unit * 16)
            .with_backoff_multiplier(2.0)
    }

    /// Calculate the delay for a given attempt number (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = self.backoff_multiplier.powi((attempt - 1) as i32);
        self.initial_delay.mul_f64(factor).min(self.max_delay)
    }

    /// Sum of every backoff a call can wait through before giving up
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_for_attempt(attempt))
            .sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::sparql_query(Duration::from_secs(1))
    }
}

/// Why a retry loop stopped before the operation had a chance to succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Cancelled,
    DeadlineExceeded,
}

/// Execute an async operation with retries, using a predicate to determine if retry is appropriate
///
/// Non-retryable errors are returned immediately. Between attempts the loop sleeps
/// for the configured backoff; a cancelled `cancel` token or a backoff that would
/// overrun `config.deadline` ends the loop with the matching [`Interrupted`] error.
///
/// # Panics
/// Panics if `config.max_attempts` is 0
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    cancel: Option<&CancellationToken>,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + From<Interrupted>,
    P: Fn(&E) -> bool,
{
    assert!(
        config.max_attempts >= 1,
        "RetryConfig.max_attempts must be >= 1, got {}",
        config.max_attempts
    );

    let started = Instant::now();
    let mut attempt = 0;

    loop {
        // Wait before retry (except for first attempt)
        let delay = config.delay_for_attempt(attempt);
        if !delay.is_zero() {
            if let Some(budget) = config.deadline {
                if started.elapsed() + delay > budget {
                    warn!(
                        "{}: Giving up before attempt {}/{}, deadline of {:?} would be exceeded",
                        operation_name,
                        attempt + 1,
                        config.max_attempts,
                        budget
                    );
                    return Err(Interrupted::DeadlineExceeded.into());
                }
            }

            debug!(
                "{}: Retry attempt {}/{} after {:?}",
                operation_name,
                attempt + 1,
                config.max_attempts,
                delay
            );
            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!("{}: Cancelled during backoff", operation_name);
                            return Err(Interrupted::Cancelled.into());
                        }
                        _ = sleep(delay) => {}
                    }
                }
                None => sleep(delay).await,
            }
        }

        if cancel.is_some_and(|token| token.is_cancelled()) {
            debug!("{}: Cancelled before attempt {}", operation_name, attempt + 1);
            return Err(Interrupted::Cancelled.into());
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        "{}: Succeeded on attempt {}/{}",
                        operation_name,
                        attempt + 1,
                        config.max_attempts
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                // Check if we should retry this error
                if !should_retry(&e) {
                    debug!(
                        "{}: Error is not retryable, failing immediately: {}",
                        operation_name, e
                    );
                    return Err(e);
                }

                let remaining = config.max_attempts - attempt - 1;
                if remaining == 0 {
                    warn!(
                        "{}: All {} attempts failed. Last error: {}",
                        operation_name, config.max_attempts, e
                    );
                    return Err(e);
                }

                warn!(
                    "{}: Attempt {}/{} failed ({}), {} retries remaining",
                    operation_name,
                    attempt + 1,
                    config.max_attempts,
                    e,
                    remaining
                );
                attempt += 1;
            }
        }
    }
}
