//! Batch runner.
//!
//! Issues `count` rounds of every [`RequestSpec`], in order, and turns each
//! logical request into exactly one [`RequestRecord`]:
//!
//! ```text
//! for iteration in 0..count
//!   for spec in specs
//!     attempt ─▶ classify ─▶ decide ─┬─ retry ─▶ sleep(backoff) ─▶ attempt
//!                                    └─ stop  ─▶ RequestRecord
//! ```
//!
//! With `concurrency > 1` a fixed pool of workers pulls `(iteration, spec)`
//! pairs off a shared cursor. Records carry their sequence number and are
//! sorted before being returned, so the output order never depends on
//! scheduling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::outcome::{AttemptResult, Classifier, OutcomeKind};
use crate::request::{HttpMethod, RequestSpec};
use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, TransportError};

pub const DEFAULT_PROGRESS_EVERY: usize = 10;

/// Final result of one logical request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Position in the deterministic issue order.
    pub sequence: usize,
    pub iteration: u32,
    pub spec_index: usize,
    pub spec_name: String,
    pub method: HttpMethod,
    pub url: String,
    pub outcome: OutcomeKind,
    /// Elapsed time of the final attempt.
    pub elapsed: Option<Duration>,
    pub attempts: u32,
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TransportError>,
}

impl RequestRecord {
    /// Short human-readable reason, used by summaries.
    pub fn reason(&self) -> String {
        match (&self.error, self.status) {
            (Some(err), _) => format!("{} ({})", self.outcome, err),
            (None, Some(status)) => match self.elapsed {
                Some(elapsed) => format!(
                    "{} (status {status}, {:.3}s)",
                    self.outcome,
                    elapsed.as_secs_f64()
                ),
                None => format!("{} (status {status})", self.outcome),
            },
            (None, None) => self.outcome.to_string(),
        }
    }
}

/// Receives `(completed, total)` as logical requests finish.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, completed: usize, total: usize);
}

impl<F> ProgressObserver for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_progress(&self, completed: usize, total: usize) {
        self(completed, total)
    }
}

/// Records produced by a batch, in issue order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub records: Vec<RequestRecord>,
    /// Logical requests the batch was asked to issue.
    pub planned: usize,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
}

struct Progress {
    completed: AtomicUsize,
    total: usize,
    every: usize,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl Progress {
    fn tick(&self) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(observer) = &self.observer {
            if done % self.every == 0 || done == self.total {
                observer.on_progress(done, self.total);
            }
        }
    }
}

/// Per-worker state; cheap to clone into spawned tasks.
#[derive(Clone)]
struct Worker {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    classifier: Classifier,
    cancel: CancellationToken,
}

impl Worker {
    /// Run one logical request to a terminal outcome.
    ///
    /// Returns `None` when cancellation lands during a backoff wait; the
    /// request is then dropped rather than recorded half-way.
    async fn execute(
        &self,
        spec: &RequestSpec,
        sequence: usize,
        iteration: u32,
        spec_index: usize,
    ) -> Option<RequestRecord> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let (result, elapsed) = self.attempt(spec).await;
            let outcome = self.classifier.classify(&result);
            let decision = self.policy.decide(outcome, attempt);

            debug!(
                spec = %spec.name,
                iteration,
                attempt,
                %outcome,
                elapsed_ms = elapsed.as_millis() as u64,
                "attempt finished"
            );

            if !decision.should_retry {
                let (status, error) = match result {
                    AttemptResult::Response { status, .. } => (Some(status), None),
                    AttemptResult::Transport(err) => (None, Some(err)),
                };
                return Some(RequestRecord {
                    sequence,
                    iteration,
                    spec_index,
                    spec_name: spec.name.clone(),
                    method: spec.method,
                    url: spec.url.clone(),
                    outcome,
                    elapsed: Some(elapsed),
                    attempts: attempt,
                    status,
                    error,
                });
            }

            warn!(
                spec = %spec.name,
                attempt,
                max_attempts = self.policy.max_attempts(),
                %outcome,
                wait_ms = decision.wait.as_millis() as u64,
                "transient failure, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(decision.wait) => {}
                _ = self.cancel.cancelled() => {
                    debug!(spec = %spec.name, sequence, "cancelled during backoff, dropping request");
                    return None;
                }
            }
        }
    }

    async fn attempt(&self, spec: &RequestSpec) -> (AttemptResult, Duration) {
        let started = Instant::now();
        let result = tokio::time::timeout(spec.timeout, self.transport.send(spec))
            .await
            .unwrap_or_else(|_| {
                Err(TransportError::timeout(format!(
                    "no response within {:?}",
                    spec.timeout
                )))
            });
        let elapsed = started.elapsed();

        let result = match result {
            Ok(response) => AttemptResult::response(response.status, elapsed),
            Err(err) => AttemptResult::Transport(err),
        };
        (result, elapsed)
    }
}

/// Drives a batch of logical requests through classifier and retry policy.
pub struct BatchRunner {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    classifier: Classifier,
    concurrency: usize,
    progress_every: usize,
    observer: Option<Arc<dyn ProgressObserver>>,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        policy: RetryPolicy,
        classifier: Classifier,
    ) -> Self {
        Self {
            transport,
            policy,
            classifier,
            concurrency: 1,
            progress_every: DEFAULT_PROGRESS_EVERY,
            observer: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Number of workers; 1 (the default) issues requests sequentially.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Check a batch without sending anything.
    pub fn validate(&self, specs: &[RequestSpec], count: u32) -> HarnessResult<()> {
        validate_batch(specs, count, self.concurrency, self.progress_every)
    }

    pub async fn run(&self, specs: &[RequestSpec], count: u32) -> HarnessResult<BatchOutcome> {
        self.validate(specs, count)?;

        let planned = specs.len() * count as usize;
        let progress = Arc::new(Progress {
            completed: AtomicUsize::new(0),
            total: planned,
            every: self.progress_every,
            observer: self.observer.clone(),
        });
        let worker = Worker {
            transport: self.transport.clone(),
            policy: self.policy,
            classifier: self.classifier,
            cancel: self.cancel.clone(),
        };

        info!(
            specs = specs.len(),
            count,
            planned,
            concurrency = self.concurrency,
            "starting batch"
        );

        let outcome = if self.concurrency == 1 {
            run_sequential(&worker, specs, count, &progress).await
        } else {
            run_concurrent(&worker, specs, planned, self.concurrency, &progress).await?
        };

        info!(
            completed = outcome.records.len(),
            planned,
            cancelled = outcome.cancelled,
            "batch finished"
        );
        Ok(outcome)
    }
}

fn validate_batch(
    specs: &[RequestSpec],
    count: u32,
    concurrency: usize,
    progress_every: usize,
) -> HarnessResult<()> {
    if specs.is_empty() {
        return Err(HarnessError::config("at least one request spec is required"));
    }
    if count == 0 {
        return Err(HarnessError::config("iteration count must be greater than 0"));
    }
    if concurrency == 0 {
        return Err(HarnessError::config("concurrency must be greater than 0"));
    }
    if progress_every == 0 {
        return Err(HarnessError::config("progress interval must be greater than 0"));
    }
    for spec in specs {
        spec.validate()?;
    }
    Ok(())
}

async fn run_sequential(
    worker: &Worker,
    specs: &[RequestSpec],
    count: u32,
    progress: &Progress,
) -> BatchOutcome {
    let planned = specs.len() * count as usize;
    let mut records = Vec::with_capacity(planned);
    let mut cancelled = false;

    'outer: for iteration in 0..count {
        for (spec_index, spec) in specs.iter().enumerate() {
            if worker.cancel.is_cancelled() {
                cancelled = true;
                break 'outer;
            }
            let sequence = iteration as usize * specs.len() + spec_index;
            match worker.execute(spec, sequence, iteration, spec_index).await {
                Some(record) => {
                    records.push(record);
                    progress.tick();
                }
                None => {
                    cancelled = true;
                    break 'outer;
                }
            }
        }
    }

    BatchOutcome {
        records,
        planned,
        cancelled,
    }
}

async fn run_concurrent(
    worker: &Worker,
    specs: &[RequestSpec],
    planned: usize,
    concurrency: usize,
    progress: &Arc<Progress>,
) -> HarnessResult<BatchOutcome> {
    let specs: Arc<[RequestSpec]> = specs.to_vec().into();
    let cursor = Arc::new(AtomicUsize::new(0));
    let (record_tx, mut record_rx) = mpsc::unbounded_channel();

    let workers = concurrency.min(planned);
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let worker = worker.clone();
        let specs = specs.clone();
        let cursor = cursor.clone();
        let progress = progress.clone();
        let record_tx = record_tx.clone();

        handles.push(tokio::spawn(async move {
            loop {
                if worker.cancel.is_cancelled() {
                    break;
                }
                let sequence = cursor.fetch_add(1, Ordering::Relaxed);
                if sequence >= planned {
                    break;
                }
                let spec_index = sequence % specs.len();
                let iteration = (sequence / specs.len()) as u32;

                match worker
                    .execute(&specs[spec_index], sequence, iteration, spec_index)
                    .await
                {
                    Some(record) => {
                        // Receiver outlives every worker.
                        let _ = record_tx.send(record);
                        progress.tick();
                    }
                    None => break,
                }
            }
        }));
    }
    drop(record_tx);

    for handle in handles {
        handle
            .await
            .map_err(|e| HarnessError::WorkerFailed(e.to_string()))?;
    }

    let mut records = Vec::with_capacity(planned);
    while let Some(record) = record_rx.recv().await {
        records.push(record);
    }
    records.sort_by_key(|r| r.sequence);

    let cancelled = records.len() < planned && worker.cancel.is_cancelled();
    Ok(BatchOutcome {
        records,
        planned,
        cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, MockHttpTransport};
    use std::sync::Mutex;

    fn classifier() -> Classifier {
        Classifier::new(200, Duration::from_secs(5))
    }

    fn spec() -> RequestSpec {
        RequestSpec::get("search", "http://127.0.0.1:3000/api/restaurant/search")
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_connection_failures_yield_one_record() {
        let mut mock = MockHttpTransport::new();
        mock.expect_send()
            .times(3)
            .returning(|_| Err(TransportError::connect("connection refused")));

        let runner = BatchRunner::new(Arc::new(mock), RetryPolicy::default(), classifier());
        let outcome = runner.run(&[spec()], 1).await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.outcome, OutcomeKind::ConnectionFailure);
        assert_eq!(record.attempts, 3);
        assert_eq!(record.status, None);
        assert!(record.error.is_some());
        assert!(!outcome.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_status_not_retried() {
        let mut mock = MockHttpTransport::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(500)));

        let runner = BatchRunner::new(Arc::new(mock), RetryPolicy::default(), classifier());
        let outcome = runner.run(&[spec()], 1).await.unwrap();

        assert_eq!(outcome.records[0].outcome, OutcomeKind::UnexpectedStatus);
        assert_eq!(outcome.records[0].attempts, 1);
        assert_eq!(outcome.records[0].status, Some(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut mock = MockHttpTransport::new();
        mock.expect_send().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TransportError::timeout("deadline"))
            } else {
                Ok(HttpResponse::new(200))
            }
        });

        let started = Instant::now();
        let runner = BatchRunner::new(Arc::new(mock), RetryPolicy::default(), classifier());
        let outcome = runner.run(&[spec()], 1).await.unwrap();

        assert_eq!(outcome.records[0].outcome, OutcomeKind::Success);
        assert_eq!(outcome.records[0].attempts, 2);
        // One 5s backoff between the attempts.
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_is_specs_then_iterations() {
        let mut mock = MockHttpTransport::new();
        mock.expect_send()
            .times(6)
            .returning(|_| Ok(HttpResponse::new(200)));

        let specs = vec![
            RequestSpec::post("signup", "http://127.0.0.1:3000/api/auth/signup"),
            RequestSpec::post("profile", "http://127.0.0.1:3000/api/user/profile"),
        ];
        let runner = BatchRunner::new(Arc::new(mock), RetryPolicy::default(), classifier());
        let outcome = runner.run(&specs, 3).await.unwrap();

        let names: Vec<&str> = outcome.records.iter().map(|r| r.spec_name.as_str()).collect();
        assert_eq!(
            names,
            ["signup", "profile", "signup", "profile", "signup", "profile"]
        );
        let iterations: Vec<u32> = outcome.records.iter().map(|r| r.iteration).collect();
        assert_eq!(iterations, [0, 0, 1, 1, 2, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_every_ten() {
        let mut mock = MockHttpTransport::new();
        mock.expect_send().returning(|_| Ok(HttpResponse::new(200)));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = move |completed: usize, total: usize| {
            sink.lock().unwrap().push((completed, total));
        };

        let runner = BatchRunner::new(Arc::new(mock), RetryPolicy::default(), classifier())
            .with_observer(Arc::new(observer));
        runner.run(&[spec()], 25).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(10, 25), (20, 25), (25, 25)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_matches_sequential_order() {
        let mut mock = MockHttpTransport::new();
        mock.expect_send()
            .times(40)
            .returning(|_| Ok(HttpResponse::new(200)));

        let specs = vec![
            RequestSpec::get("a", "http://127.0.0.1:3000/a"),
            RequestSpec::get("b", "http://127.0.0.1:3000/b"),
        ];
        let runner = BatchRunner::new(Arc::new(mock), RetryPolicy::default(), classifier())
            .with_concurrency(4);
        let outcome = runner.run(&specs, 20).await.unwrap();

        assert_eq!(outcome.records.len(), 40);
        for (idx, record) in outcome.records.iter().enumerate() {
            assert_eq!(record.sequence, idx);
            assert_eq!(record.spec_index, idx % 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_drops_request() {
        let mut mock = MockHttpTransport::new();
        mock.expect_send()
            .returning(|_| Err(TransportError::connect("connection refused")));

        let runner = BatchRunner::new(Arc::new(mock), RetryPolicy::default(), classifier());
        let token = runner.cancellation();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });

        let outcome = runner.run(&[spec()], 5).await.unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.planned, 5);
    }

    #[tokio::test]
    async fn test_config_errors_before_any_request() {
        let mut mock = MockHttpTransport::new();
        mock.expect_send().never();
        let runner = BatchRunner::new(Arc::new(mock), RetryPolicy::default(), classifier());

        assert!(runner.run(&[], 10).await.unwrap_err().is_configuration());
        assert!(runner.run(&[spec()], 0).await.unwrap_err().is_configuration());

        let runner = runner.with_concurrency(0);
        assert!(runner.run(&[spec()], 1).await.unwrap_err().is_configuration());
    }

    #[test]
    fn test_record_reason() {
        let record = RequestRecord {
            sequence: 0,
            iteration: 0,
            spec_index: 0,
            spec_name: "search".to_string(),
            method: HttpMethod::Get,
            url: "http://127.0.0.1/".to_string(),
            outcome: OutcomeKind::SlowResponse,
            elapsed: Some(Duration::from_millis(6250)),
            attempts: 1,
            status: Some(200),
            error: None,
        };
        assert_eq!(record.reason(), "slow_response (status 200, 6.250s)");
    }
}
