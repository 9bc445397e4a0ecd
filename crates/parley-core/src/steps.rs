//! Named, individually retried units of work
//!
//! Used by the greeting saga and the post-processing job. Each step is
//! retried with linear backoff until it succeeds or runs out of attempts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; the n-th retry waits n times this
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("step {step} failed after {attempts} attempt(s): {message}")]
pub struct StepError {
    pub step: &'static str,
    pub attempts: u32,
    pub message: String,
}

/// Run `f` until it succeeds or `policy.max_attempts` is reached
pub async fn run_step<T, E, F, Fut>(
    policy: &RetryPolicy,
    step: &'static str,
    mut f: F,
) -> Result<T, StepError>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => {
                debug!("Step {} succeeded on attempt {}", step, attempt);
                return Ok(value);
            }
            Err(e) if attempt < policy.max_attempts => {
                warn!(
                    "Step {} failed (attempt {}/{}): {}",
                    step, attempt, policy.max_attempts, e
                );
                tokio::time::sleep(policy.retry_delay * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(StepError {
                    step,
                    attempts: attempt,
                    message: e.to_string(),
                })
            }
        }
    }
}
