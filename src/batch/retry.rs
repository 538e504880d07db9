use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Fixed attempt cap plus fixed delay between attempts.
///
/// No backoff and no jitter: every wait is exactly `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

/// What a single attempt produced, as seen by the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome<E> {
    Success,
    Failure(E),
    /// Cancellation never consumes an attempt.
    Cancelled,
}

/// The result of feeding an attempt outcome into a [`RetryLoop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<E> {
    /// The attempt succeeded; stop looping.
    Done,
    /// Wait `delay`, then run retry number `retry` of `max_retries`.
    Retry {
        retry: u32,
        max_retries: u32,
        delay: Duration,
        reason: E,
    },
    /// The last allowed attempt failed.
    Exhausted(E),
    /// Cancellation was observed; propagate it.
    Cancelled,
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt; values below 1 are raised to 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Worker execution: two retries after the first attempt, 10s apart.
    pub fn execution() -> Self {
        Self::new(3, Duration::from_secs(10))
    }

    /// Result delivery: three attempts in total, 5s apart.
    pub fn delivery() -> Self {
        Self::new(3, Duration::from_secs(5))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_retries(&self) -> u32 {
        self.max_attempts - 1
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn start(&self) -> RetryLoop {
        RetryLoop {
            policy: *self,
            attempts: 0,
        }
    }

    pub async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    /// Waits out the delay unless `cancel` fires first.
    ///
    /// Returns `false` when cancelled.
    pub async fn wait_or_cancel(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            () = cancel.cancelled() => false,
            () = self.wait() => !cancel.is_cancelled(),
        }
    }
}

/// Per-job progress through a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryLoop {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryLoop {
    /// Attempts consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Compute the next transition for the given attempt outcome.
    ///
    /// Every failure is retryable until the cap is reached; the cause is
    /// never inspected.
    pub fn next<E>(&mut self, outcome: AttemptOutcome<E>) -> Transition<E> {
        match outcome {
            AttemptOutcome::Cancelled => Transition::Cancelled,
            AttemptOutcome::Success => {
                self.attempts += 1;
                Transition::Done
            }
            AttemptOutcome::Failure(reason) => {
                self.attempts += 1;
                if self.attempts < self.policy.max_attempts {
                    Transition::Retry {
                        retry: self.attempts,
                        max_retries: self.policy.max_retries(),
                        delay: self.policy.delay(),
                        reason,
                    }
                } else {
                    Transition::Exhausted(reason)
                }
            }
        }
    }
}
