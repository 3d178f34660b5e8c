//! End-to-end scenarios on virtual time.
//!
//! A scripted transport replays a fixed sequence of responses, sleeping on
//! the paused tokio clock to simulate latency, so runs are deterministic.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use verification::{
    run_sla_test, BatchRunner, Classifier, HttpResponse, HttpTransport, OutcomeKind,
    RequestSpec, RetryPolicy, SlaRequirement, TransportError,
};

enum Step {
    Respond { status: u16, latency: Duration },
    Refuse,
}

struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
}

impl ScriptedTransport {
    fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
        })
    }

    fn remaining(&self) -> usize {
        self.steps.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, _spec: &RequestSpec) -> Result<HttpResponse, TransportError> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Respond { status, latency }) => {
                tokio::time::sleep(latency).await;
                Ok(HttpResponse::new(status))
            }
            Some(Step::Refuse) | None => Err(TransportError::connect("connection refused")),
        }
    }
}

fn respond(status: u16, millis: u64) -> Step {
    Step::Respond {
        status,
        latency: Duration::from_millis(millis),
    }
}

fn search() -> RequestSpec {
    RequestSpec::get("search", "http://127.0.0.1:3000/api/restaurant/search")
        .with_query("latitude", 49.2606)
        .with_query("longitude", 1)
        .with_query("radius", 5000)
        .with_timeout(Duration::from_secs(10))
}

#[tokio::test(start_paused = true)]
async fn test_search_sla_passes_with_few_slow_responses() {
    let steps = (0..101).map(|i| if i % 17 == 3 { respond(200, 6_000) } else { respond(200, 900) });
    let transport = ScriptedTransport::new(steps);
    let requirement = SlaRequirement::new(Duration::from_secs(5), 0.90, 200).unwrap();

    let verdict = run_sla_test(
        transport.clone(),
        vec![search()],
        101,
        RetryPolicy::default(),
        requirement,
    )
    .await
    .unwrap();

    assert_eq!(verdict.total_count, 101);
    assert_eq!(verdict.failure_count, 6);
    assert_eq!(verdict.outcome_counts[&OutcomeKind::SlowResponse], 6);
    assert!((verdict.observed_ratio - 0.9406).abs() < 1e-4);
    assert!(verdict.pass);
    assert!(verdict.latency.max >= Duration::from_secs(6));
    assert!(verdict.latency.max < Duration::from_millis(6_010));
    assert_eq!(transport.remaining(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_search_sla_fails_on_server_errors() {
    let steps = (0..101).map(|i| if i < 85 { respond(200, 400) } else { respond(503, 50) });
    let transport = ScriptedTransport::new(steps);
    let requirement = SlaRequirement::new(Duration::from_secs(5), 0.90, 200).unwrap();

    let verdict = run_sla_test(transport, vec![search()], 101, RetryPolicy::default(), requirement)
        .await
        .unwrap();

    assert!(!verdict.pass);
    assert!((verdict.observed_ratio - 0.8416).abs() < 1e-4);
    assert_eq!(verdict.violating_records.len(), 16);
    assert!(verdict
        .violating_records
        .iter()
        .all(|r| r.outcome == OutcomeKind::UnexpectedStatus && r.attempts == 1));
}

#[tokio::test(start_paused = true)]
async fn test_transient_refusals_absorbed_by_retries() {
    // Two refusals, then the service recovers for good.
    let steps = [Step::Refuse, Step::Refuse]
        .into_iter()
        .chain((0..10).map(|_| respond(200, 100)));
    let transport = ScriptedTransport::new(steps);

    let runner = BatchRunner::new(
        transport,
        RetryPolicy::new(3, Duration::from_secs(5)).unwrap(),
        Classifier::new(200, Duration::from_secs(5)),
    );
    let outcome = runner.run(&[search()], 10).await.unwrap();

    assert_eq!(outcome.records.len(), 10);
    assert_eq!(outcome.records[0].attempts, 3);
    assert_eq!(outcome.records[0].outcome, OutcomeKind::Success);
    let elapsed = outcome.records[0].elapsed.unwrap();
    assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(110));
    assert!(outcome.records[1..].iter().all(|r| r.attempts == 1));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_recorded_not_raised() {
    let transport = ScriptedTransport::new(Vec::new());
    let runner = BatchRunner::new(
        transport,
        RetryPolicy::new(3, Duration::from_secs(5)).unwrap(),
        Classifier::new(200, Duration::from_secs(5)),
    );

    let outcome = runner.run(&[search()], 2).await.unwrap();
    assert_eq!(outcome.records.len(), 2);
    for record in &outcome.records {
        assert_eq!(record.outcome, OutcomeKind::ConnectionFailure);
        assert_eq!(record.attempts, 3);
    }
}
