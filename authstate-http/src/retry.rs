//! Retry of transient token-endpoint failures.

use std::future::Future;
use std::time::Duration;

use authstate_core::TokenExchangeError;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Initial delay.
    pub initial_delay: Duration,
    /// Maximum delay.
    pub max_delay: Duration,
    /// Multiplier for each retry.
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Create the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Never retry.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set max retries.
    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set initial delay.
    #[must_use]
    pub fn initial_delay(mut self, d: Duration) -> Self {
        self.initial_delay = d;
        self
    }

    /// Set max delay.
    #[must_use]
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    /// Set jitter factor.
    #[must_use]
    pub fn jitter(mut self, j: f64) -> Self {
        self.jitter = j.clamp(0.0, 1.0);
        self
    }

    /// Calculate delay before retry number `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let jitter = if self.jitter > 0.0 {
            base * self.jitter * rand::thread_rng().gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        let delay = base + jitter;
        if delay >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Run `operation`, retrying errors that are retryable.
    pub async fn run<F, Fut, T>(&self, operation: F) -> Result<T, TokenExchangeError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, TokenExchangeError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt <= self.max_retries => {
                    let wait = self.delay_for(attempt);
                    debug!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %error,
                        "Retrying token request"
                    );
                    sleep(wait).await;
                }
                Err(error) => {
                    if error.is_retryable() {
                        warn!(attempt, error = %error, "Token request retries exhausted");
                    }
                    return Err(error);
                }
            }
        }
    }
}
