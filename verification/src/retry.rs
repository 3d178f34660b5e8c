//! Retry policy for transient failures.
//!
//! | Outcome | Retried | Notes |
//! |---|---|---|
//! | ConnectionFailure | yes | until `max_attempts` |
//! | Timeout | yes | until `max_attempts` |
//! | UnexpectedStatus | no | the service answered |
//! | SlowResponse | no | the service answered |
//! | Success | no | terminal |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::outcome::OutcomeKind;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub wait: Duration,
}

impl RetryDecision {
    pub fn stop() -> Self {
        Self {
            should_retry: false,
            wait: Duration::ZERO,
        }
    }

    pub fn retry_after(wait: Duration) -> Self {
        Self {
            should_retry: true,
            wait,
        }
    }
}

/// Decide whether `attempt` (1-based) should be followed by another one.
pub fn decide(
    outcome: OutcomeKind,
    attempt: u32,
    max_attempts: u32,
    backoff: Duration,
) -> RetryDecision {
    if !outcome.is_transient() || attempt >= max_attempts {
        return RetryDecision::stop();
    }
    RetryDecision::retry_after(backoff)
}

/// Fixed-backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt, so 1 means "never retry".
    pub fn new(max_attempts: u32, backoff: Duration) -> HarnessResult<Self> {
        if max_attempts == 0 {
            return Err(HarnessError::config("max_attempts must be at least 1"));
        }
        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    /// A policy that records the first outcome as final.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn decide(&self, outcome: OutcomeKind, attempt: u32) -> RetryDecision {
        decide(outcome, attempt, self.max_attempts, self.backoff)
    }
}

impl Default for RetryPolicy {
    /// Default: 3 attempts, 5s between them.
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}
