//! End-to-end SLA test: preflight gate, batch, verdict.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::HarnessResult;
use crate::evaluator::{evaluate, SlaRequirement, Verdict};
use crate::outcome::Classifier;
use crate::preflight::{self, PreflightConfig, PreflightReport};
use crate::request::RequestSpec;
use crate::retry::RetryPolicy;
use crate::runner::{BatchRunner, ProgressObserver, DEFAULT_PROGRESS_EVERY};
use crate::transport::HttpTransport;

/// Everything known about one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaRunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preflight: Option<PreflightReport>,
    pub planned: usize,
    pub cancelled: bool,
    pub verdict: Verdict,
}

/// Builder for a full SLA run.
pub struct SlaTest {
    transport: Arc<dyn HttpTransport>,
    specs: Vec<RequestSpec>,
    count: u32,
    retry_policy: RetryPolicy,
    requirement: SlaRequirement,
    preflight: Option<PreflightConfig>,
    concurrency: usize,
    progress_every: usize,
    observer: Option<Arc<dyn ProgressObserver>>,
    cancel: CancellationToken,
}

impl SlaTest {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        specs: Vec<RequestSpec>,
        count: u32,
        requirement: SlaRequirement,
    ) -> Self {
        Self {
            transport,
            specs,
            count,
            retry_policy: RetryPolicy::default(),
            requirement,
            preflight: None,
            concurrency: 1,
            progress_every: DEFAULT_PROGRESS_EVERY,
            observer: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Gate the batch on a liveness endpoint.
    pub fn preflight(mut self, config: PreflightConfig) -> Self {
        self.preflight = Some(config);
        self
    }

    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    pub fn progress_every(mut self, every: usize) -> Self {
        self.progress_every = every;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub async fn run(self) -> HarnessResult<SlaRunReport> {
        self.requirement.validate()?;
        if let Some(config) = &self.preflight {
            config.validate()?;
        }

        let mut runner = BatchRunner::new(
            self.transport.clone(),
            self.retry_policy,
            Classifier::from(&self.requirement),
        )
        .with_concurrency(self.concurrency)
        .with_progress_every(self.progress_every)
        .with_cancellation(self.cancel.clone());
        if let Some(observer) = self.observer.clone() {
            runner = runner.with_observer(observer);
        }
        runner.validate(&self.specs, self.count)?;

        let started_at = Utc::now();
        let planned = self.specs.len() * self.count as usize;
        let preflight = match &self.preflight {
            Some(config) => {
                let report =
                    preflight::check_with_cancellation(self.transport.as_ref(), config, &self.cancel)
                        .await?
                        .into_result()?;
                Some(report)
            }
            None => None,
        };

        if preflight.as_ref().is_some_and(|p| p.cancelled) {
            warn!("Cancelled during preflight; no requests issued");
            return Ok(SlaRunReport {
                started_at,
                finished_at: Utc::now(),
                preflight,
                planned,
                cancelled: true,
                verdict: evaluate(&[], &self.requirement),
            });
        }

        let batch = runner.run(&self.specs, self.count).await?;
        let verdict = evaluate(&batch.records, &self.requirement);

        info!(
            pass = verdict.pass,
            observed_ratio = verdict.observed_ratio,
            required_ratio = verdict.required_ratio,
            failures = verdict.failure_count,
            total = verdict.total_count,
            "SLA verdict"
        );

        Ok(SlaRunReport {
            started_at,
            finished_at: Utc::now(),
            preflight,
            planned: batch.planned,
            cancelled: batch.cancelled,
            verdict,
        })
    }
}

/// Run a batch and evaluate it, without preflight or progress reporting.
pub async fn run_sla_test(
    transport: Arc<dyn HttpTransport>,
    specs: Vec<RequestSpec>,
    count: u32,
    retry_policy: RetryPolicy,
    requirement: SlaRequirement,
) -> HarnessResult<Verdict> {
    let report = SlaTest::new(transport, specs, count, requirement)
        .retry_policy(retry_policy)
        .run()
        .await?;
    Ok(report.verdict)
}
