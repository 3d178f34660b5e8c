//! Preflight health check.
//!
//! Polls a liveness endpoint until it answers 200 or the wait budget is
//! spent. Every sleep between probes adds one poll interval to the
//! accumulated wait, and a further sleep is only taken while it stays
//! under the budget, so `max_total_wait` allows
//! `ceil(max_total_wait / poll_interval)` probes.
//!
//! ```text
//! probe ──200──▶ ready
//!   │
//!   └─fail─▶ waited + poll >= budget? ─yes─▶ not ready
//!                   │
//!                   └─no─▶ sleep(poll) ; waited += poll ─▶ probe
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::request::RequestSpec;
use crate::transport::{HttpTransport, TransportError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_TOTAL_WAIT: Duration = Duration::from_secs(30);
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightConfig {
    /// Liveness URL, e.g. `http://host:3000/health`.
    pub url: String,
    pub poll_interval: Duration,
    pub max_total_wait: Duration,
    pub attempt_timeout: Duration,
}

impl PreflightConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_total_wait: DEFAULT_MAX_TOTAL_WAIT,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn max_total_wait(mut self, wait: Duration) -> Self {
        self.max_total_wait = wait;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Number of probes the budget allows (always at least one).
    pub fn max_attempts(&self) -> u32 {
        if self.poll_interval.is_zero() {
            return 1;
        }
        let budget = self.max_total_wait.as_nanos();
        let step = self.poll_interval.as_nanos();
        budget.div_ceil(step).max(1) as u32
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.poll_interval.is_zero() {
            return Err(HarnessError::config("preflight poll_interval must be > 0"));
        }
        if self.attempt_timeout.is_zero() {
            return Err(HarnessError::config("preflight attempt_timeout must be > 0"));
        }
        self.probe_spec().validate()
    }

    fn probe_spec(&self) -> RequestSpec {
        RequestSpec::get("preflight", self.url.clone()).with_timeout(self.attempt_timeout)
    }
}

/// Outcome of a preflight run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightReport {
    pub url: String,
    pub ready: bool,
    pub attempts: u32,
    /// Accumulated wait between probes.
    pub waited: Duration,
    pub last_error: Option<String>,
    /// Polling stopped early on cancellation.
    #[serde(default)]
    pub cancelled: bool,
}

impl PreflightReport {
    /// Convert a not-ready report into the fatal error that blocks a run.
    ///
    /// Cancelled reports pass through; the caller decides what a cancelled
    /// run means.
    pub fn into_result(self) -> HarnessResult<Self> {
        if self.ready || self.cancelled {
            return Ok(self);
        }
        Err(HarnessError::PreflightFailed {
            url: self.url,
            attempts: self.attempts,
            waited: self.waited,
            last_error: self.last_error,
        })
    }
}

/// Poll the liveness endpoint and report how it went.
pub async fn check(
    transport: &dyn HttpTransport,
    config: &PreflightConfig,
) -> HarnessResult<PreflightReport> {
    check_with_cancellation(transport, config, &CancellationToken::new()).await
}

/// Like [`check`], but stops polling as soon as `cancel` fires.
///
/// The budget is tested before sleeping, so the last allowed probe is
/// followed directly by the report.
pub async fn check_with_cancellation(
    transport: &dyn HttpTransport,
    config: &PreflightConfig,
    cancel: &CancellationToken,
) -> HarnessResult<PreflightReport> {
    config.validate()?;
    let spec = config.probe_spec();

    let mut report = PreflightReport {
        url: config.url.clone(),
        ready: false,
        attempts: 0,
        waited: Duration::ZERO,
        last_error: None,
        cancelled: false,
    };

    loop {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        report.attempts += 1;
        let probed = tokio::select! {
            result = probe(transport, &spec) => result,
            _ = cancel.cancelled() => {
                report.cancelled = true;
                break;
            }
        };

        match probed {
            Ok(()) => {
                info!(url = %config.url, attempts = report.attempts, "Successfully connected to server");
                report.ready = true;
                report.last_error = None;
                return Ok(report);
            }
            Err(reason) => {
                warn!(
                    url = %config.url,
                    attempt = report.attempts,
                    max_attempts = config.max_attempts(),
                    %reason,
                    "Failed to connect to server"
                );
                report.last_error = Some(reason);
            }
        }

        if report.waited + config.poll_interval >= config.max_total_wait {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval) => {}
            _ = cancel.cancelled() => {
                report.cancelled = true;
                break;
            }
        }
        report.waited += config.poll_interval;
    }

    if report.cancelled {
        info!(url = %config.url, attempts = report.attempts, "Preflight cancelled");
    }
    Ok(report)
}

/// `true` once the endpoint answers 200 within the budget.
pub async fn confirm(
    transport: &dyn HttpTransport,
    config: &PreflightConfig,
) -> HarnessResult<bool> {
    Ok(check(transport, config).await?.ready)
}

async fn probe(transport: &dyn HttpTransport, spec: &RequestSpec) -> Result<(), String> {
    // Guard the whole exchange, a server can accept and then hang.
    let result = tokio::time::timeout(spec.timeout, transport.send(spec))
        .await
        .unwrap_or_else(|_| Err(TransportError::timeout("response timeout")));

    match result {
        Ok(response) if response.status == 200 => Ok(()),
        Ok(response) => {
            debug!(status = response.status, "liveness probe answered non-200");
            Err(format!("non-ready status {}", response.status))
        }
        Err(err) => Err(err.to_string()),
    }
}
