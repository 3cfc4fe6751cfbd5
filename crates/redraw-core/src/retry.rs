//! Bounded retry combinator.
//!
//! Both waits in the pipeline are built on [`retry`]: the completion watcher
//! polls against a deadline, the artifact claim retries a rename a fixed
//! number of times. An operation reports each attempt as an [`Attempt`], which
//! keeps the retryable-vs-fatal decision next to the operation itself.
//!
//! ## Guarantees
//!
//! - At least one attempt is always made, even with a zero deadline.
//! - The combinator never sleeps after the final attempt.
//! - A [`Attempt::Fail`] stops immediately, whatever budget is left.

use core::future::Future;
use core::time::Duration;
use tokio::time::{Instant, sleep};

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The operation succeeded.
    Done(T),
    /// The operation failed transiently and may be tried again.
    Retry(E),
    /// The operation failed in a way retrying cannot fix.
    Fail(E),
}

/// Why [`retry`] gave up.
#[derive(thiserror::Error, Debug)]
pub enum RetryError<E> {
    /// The attempt or time budget ran out; `last` is the final transient error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// An attempt reported a non-retryable failure.
    #[error("{0}")]
    Fatal(E),
}

/// Budget for a retry loop.
///
/// A policy may bound attempts, elapsed time, or both; whichever runs out
/// first ends the loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
    pub delay: Duration,
}

impl RetryPolicy {
    /// At most `max_attempts` tries with `delay` between them.
    pub const fn attempts(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            deadline: None,
            delay,
        }
    }

    /// Keep trying every `interval` until `timeout` has elapsed.
    pub const fn deadline(timeout: Duration, interval: Duration) -> Self {
        Self {
            max_attempts: None,
            deadline: Some(timeout),
            delay: interval,
        }
    }

    fn exhausted(&self, attempts: u32, started: Instant) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self.deadline.is_some_and(|limit| started.elapsed() >= limit)
    }
}

/// Runs `op` until it succeeds, fails fatally, or the policy runs out.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    let started = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        match op(attempts).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fail(err) => return Err(RetryError::Fatal(err)),
            Attempt::Retry(err) => {
                if policy.exhausted(attempts, started) {
                    return Err(RetryError::Exhausted {
                        attempts,
                        last: err,
                    });
                }
                sleep(policy.delay).await;
            }
        }
    }
}
