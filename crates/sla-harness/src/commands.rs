//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use verification::{HttpTransport, PreflightConfig, SlaRunReport, SlaTest};

use crate::cli::{PreflightArgs, RunArgs};
use crate::config::ScenarioConfig;
use crate::output::{self, EXIT_FAIL, EXIT_PASS};
use crate::progress::TracingProgress;

/// Load a scenario and fold command-line overrides into it.
pub fn load_scenario(args: &RunArgs) -> Result<ScenarioConfig> {
    let mut config = ScenarioConfig::load(&args.scenario)?;
    if let Some(url) = &args.base_url {
        config.base_url = url.clone();
    }
    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if args.skip_preflight {
        config.preflight.enabled = false;
    }
    config.validate()?;
    Ok(config)
}

/// Run a scenario to a report.
pub async fn run_scenario(
    config: &ScenarioConfig,
    transport: Arc<dyn HttpTransport>,
    progress_every: usize,
    cancel: CancellationToken,
) -> Result<SlaRunReport> {
    let specs = config.request_specs()?;
    info!(
        scenario = %config.name,
        requests = specs.len(),
        iterations = config.iterations,
        concurrency = config.concurrency,
        "Starting SLA run"
    );

    let mut test = SlaTest::new(transport, specs, config.iterations, config.requirement()?)
        .retry_policy(config.retry_policy()?)
        .concurrency(config.concurrency)
        .progress_every(progress_every)
        .observer(Arc::new(TracingProgress))
        .cancellation(cancel);
    match config.preflight_config()? {
        Some(preflight) => test = test.preflight(preflight),
        None => warn!("Preflight disabled; requests go out without a health check"),
    }

    let report = test
        .run()
        .await
        .with_context(|| format!("SLA run '{}' failed", config.name))?;
    Ok(report)
}

pub async fn run(
    args: &RunArgs,
    transport: Arc<dyn HttpTransport>,
    cancel: CancellationToken,
) -> Result<u8> {
    let config = load_scenario(args)?;
    let report = run_scenario(&config, transport, args.progress_every, cancel).await?;
    println!("{}", output::render(&report, &config.name, args.format)?);
    Ok(output::exit_status(&report))
}

pub async fn preflight(args: &PreflightArgs, transport: Arc<dyn HttpTransport>) -> Result<u8> {
    let config = PreflightConfig::new(&args.url)
        .poll_interval(seconds(args.poll_interval_secs, "--poll-interval-secs")?)
        .max_total_wait(seconds(args.max_wait_secs, "--max-wait-secs")?)
        .attempt_timeout(seconds(args.timeout_secs, "--timeout-secs")?);

    let report = verification::preflight::check(transport.as_ref(), &config).await?;
    if report.ready {
        println!(
            "{} is ready (attempt {}, waited {:.1}s)",
            report.url,
            report.attempts,
            report.waited.as_secs_f64()
        );
        Ok(EXIT_PASS)
    } else {
        println!(
            "{} not ready after {} attempt(s): {}",
            report.url,
            report.attempts,
            report.last_error.as_deref().unwrap_or("no response")
        );
        Ok(EXIT_FAIL)
    }
}

pub fn validate(path: &std::path::Path) -> Result<u8> {
    let config = ScenarioConfig::load(path)?;
    let specs = config.request_specs()?;
    println!(
        "{}: {} request(s) x {} iteration(s) = {} planned",
        config.name,
        specs.len(),
        config.iterations,
        specs.len() * config.iterations as usize
    );
    for spec in &specs {
        println!("  {} {} {}", spec.method, spec.name, spec.url);
    }
    Ok(EXIT_PASS)
}

fn seconds(value: f64, flag: &str) -> Result<std::time::Duration> {
    std::time::Duration::try_from_secs_f64(value)
        .with_context(|| format!("{flag} must be a non-negative number, got {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use verification::{HttpResponse, RequestSpec, TransportError};

    struct CountingTransport {
        status: u16,
        health_calls: AtomicUsize,
        calls: AtomicUsize,
    }

    impl CountingTransport {
        fn new(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status,
                health_calls: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for CountingTransport {
        async fn send(&self, spec: &RequestSpec) -> Result<HttpResponse, TransportError> {
            if spec.url.ends_with("/health") {
                self.health_calls.fetch_add(1, Ordering::SeqCst);
                return Ok(HttpResponse::new(200));
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse::new(self.status))
        }
    }

    const SCENARIO: &str = r#"
name = "unauthorized_access"
base_url = "http://localhost:3000"
iterations = 5

[requirement]
expected_status = 401
latency_bound_secs = 2
required_pass_ratio = 0.95

[[request]]
name = "auth/signup"
method = "POST"
path = "/api/auth/signup"
json = { idToken = "fake_token1234" }

[[request]]
name = "matching/join"
method = "POST"
path = "/api/matching/join"
json = { idToken = "fake_token1234" }
"#;

    #[tokio::test(start_paused = true)]
    async fn test_scenario_runs_preflight_then_batch() {
        let config: ScenarioConfig = toml::from_str(SCENARIO).unwrap();
        let transport = CountingTransport::new(401);

        let report = run_scenario(&config, transport.clone(), 10, CancellationToken::new())
            .await
            .unwrap();

        assert!(report.verdict.pass);
        assert_eq!(report.verdict.total_count, 10);
        assert_eq!(transport.health_calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 10);
        assert!(report.preflight.unwrap().ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_preflight_skips_health_check() {
        let mut config: ScenarioConfig = toml::from_str(SCENARIO).unwrap();
        config.preflight.enabled = false;
        let transport = CountingTransport::new(200);

        let report = run_scenario(&config, transport.clone(), 10, CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.verdict.pass);
        assert_eq!(report.verdict.failure_count, 10);
        assert_eq!(transport.health_calls.load(Ordering::SeqCst), 0);
        assert!(report.preflight.is_none());
    }

    #[test]
    fn test_seconds_rejects_negative() {
        assert!(seconds(-1.0, "--max-wait-secs").is_err());
        assert_eq!(seconds(0.5, "--timeout-secs").unwrap().as_millis(), 500);
    }
}
