use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_MIDPOINT_PAUSE: Duration = Duration::from_millis(2000);

/// How many times to try an operation and how long to wait after each failed
/// attempt. `backoff` receives the 1-based number of the attempt that failed.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    backoff: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(backoff),
        }
    }

    /// Retry immediately, except for a single longer pause once half the
    /// attempts (rounded up) have failed.
    pub fn midpoint_pause(max_attempts: u32, pause: Duration) -> Self {
        let midpoint = max_attempts.div_ceil(2);
        Self::new(max_attempts, move |attempt| {
            if attempt == midpoint {
                pause
            } else {
                Duration::ZERO
            }
        })
    }

    /// `base`, `2 * base`, `4 * base`, ...
    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self::new(max_attempts, move |attempt| {
            base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        })
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::midpoint_pause(DEFAULT_MAX_ATTEMPTS, DEFAULT_MIDPOINT_PAUSE)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// The last error of an operation that did not succeed, and how many
/// attempts were made.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub error: E,
}

/// Run `op` until it succeeds or the policy's attempts are used up.
/// `op` receives the 1-based attempt number.
pub async fn retry_with_policy<T, E, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    retry_if(policy, |_| true, op).await
}

/// Like [`retry_with_policy`], but errors for which `should_retry` is false
/// are returned at once.
pub async fn retry_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut op: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= policy.max_attempts || !should_retry(&error) => {
                return Err(RetryFailure {
                    attempts: attempt,
                    error,
                });
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                debug!(
                    "Attempt {}/{} failed: {}; retrying in {}ms",
                    attempt,
                    policy.max_attempts,
                    error,
                    delay.as_millis()
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}
