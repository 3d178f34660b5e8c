//! Outcome classification.
//!
//! Maps what happened on one attempt to exactly one [`OutcomeKind`]. The
//! decision order is fixed:
//!
//! ```text
//! transport failure (non-timeout) → ConnectionFailure
//! transport timeout               → Timeout
//! status == expected, fast        → Success
//! status == expected, slow        → SlowResponse
//! status != expected              → UnexpectedStatus
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::evaluator::SlaRequirement;
use crate::transport::{TransportError, TransportErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Expected status within the latency bound.
    Success,
    /// The service answered with a different status code.
    UnexpectedStatus,
    /// No response within the attempt timeout.
    Timeout,
    /// Transport failed before any response arrived.
    ConnectionFailure,
    /// Expected status, but slower than the latency bound.
    SlowResponse,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 5] = [
        Self::Success,
        Self::UnexpectedStatus,
        Self::Timeout,
        Self::ConnectionFailure,
        Self::SlowResponse,
    ];

    /// Transient outcomes may resolve on retry.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionFailure)
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::UnexpectedStatus => write!(f, "unexpected_status"),
            Self::Timeout => write!(f, "timeout"),
            Self::ConnectionFailure => write!(f, "connection_failure"),
            Self::SlowResponse => write!(f, "slow_response"),
        }
    }
}

/// Raw result of a single attempt, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult {
    Response { status: u16, elapsed: Duration },
    Transport(TransportError),
}

impl AttemptResult {
    pub fn response(status: u16, elapsed: Duration) -> Self {
        Self::Response { status, elapsed }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }
}

/// Classifies attempts against an expected status and latency bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    pub expected_status: u16,
    pub latency_bound: Duration,
}

impl Classifier {
    pub fn new(expected_status: u16, latency_bound: Duration) -> Self {
        Self {
            expected_status,
            latency_bound,
        }
    }

    pub fn classify(&self, attempt: &AttemptResult) -> OutcomeKind {
        match attempt {
            AttemptResult::Transport(err) => match err.kind {
                TransportErrorKind::Timeout => OutcomeKind::Timeout,
                _ => OutcomeKind::ConnectionFailure,
            },
            AttemptResult::Response { status, elapsed } => {
                if *status != self.expected_status {
                    OutcomeKind::UnexpectedStatus
                } else if *elapsed > self.latency_bound {
                    OutcomeKind::SlowResponse
                } else {
                    OutcomeKind::Success
                }
            }
        }
    }
}

impl From<&SlaRequirement> for Classifier {
    fn from(requirement: &SlaRequirement) -> Self {
        Self::new(requirement.expected_status, requirement.latency_bound)
    }
}
