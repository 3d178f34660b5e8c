//! Environment overrides. Kept in its own test binary since it mutates
//! process environment.

use std::path::PathBuf;

use sla_harness::cli::{OutputFormat, RunArgs};
use sla_harness::commands::load_scenario;
use sla_harness::config::ScenarioConfig;

fn scenario() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios/unauthorized_access.toml")
}

#[test]
fn test_env_then_flags_override_scenario() {
    std::env::set_var("SLA_BASE_URL", "http://staging.internal:8080/");
    std::env::set_var("SLA_ITERATIONS", "7");
    std::env::set_var("SLA_CONCURRENCY", "4");

    let config = ScenarioConfig::load(&scenario()).unwrap();
    assert_eq!(config.iterations, 7);
    assert_eq!(config.concurrency, 4);
    let specs = config.request_specs().unwrap();
    assert_eq!(specs[0].url, "http://staging.internal:8080/api/auth/signup");

    let args = RunArgs {
        scenario: scenario(),
        base_url: Some("http://10.0.0.5:3000".to_string()),
        iterations: None,
        concurrency: Some(2),
        skip_preflight: true,
        progress_every: 10,
        format: OutputFormat::Text,
    };
    let config = load_scenario(&args).unwrap();
    assert_eq!(config.iterations, 7);
    assert_eq!(config.concurrency, 2);
    assert!(config.preflight_config().unwrap().is_none());
    assert_eq!(
        config.request_specs().unwrap()[3].url,
        "http://10.0.0.5:3000/api/matching/join"
    );

    std::env::set_var("SLA_CONCURRENCY", "many");
    let err = ScenarioConfig::load(&scenario()).unwrap_err();
    assert!(err.to_string().contains("SLA_CONCURRENCY"), "{err}");

    std::env::remove_var("SLA_BASE_URL");
    std::env::remove_var("SLA_ITERATIONS");
    std::env::remove_var("SLA_CONCURRENCY");
}
