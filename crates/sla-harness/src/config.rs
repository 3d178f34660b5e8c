//! Scenario configuration.
//!
//! A scenario is a TOML file describing the target, the SLA, and the
//! requests to issue. `SLA_BASE_URL`, `SLA_ITERATIONS` and `SLA_CONCURRENCY`
//! override the file; command-line flags override both.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use verification::retry::{DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS};
use verification::{
    HttpMethod, PreflightConfig, RequestBody, RequestSpec, RetryPolicy, SlaRequirement,
};

fn default_iterations() -> u32 {
    101
}

fn default_concurrency() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Top-level scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Prefix for relative request paths, e.g. `http://localhost:3000`.
    pub base_url: String,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub preflight: PreflightSection,
    #[serde(default)]
    pub retry: RetrySection,
    pub requirement: RequirementSection,
    #[serde(rename = "request")]
    pub requests: Vec<RequestSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreflightSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "PreflightSection::default_path")]
    pub path: String,
    #[serde(default = "PreflightSection::default_poll")]
    pub poll_interval_secs: f64,
    #[serde(default = "PreflightSection::default_wait")]
    pub max_total_wait_secs: f64,
    #[serde(default = "PreflightSection::default_timeout")]
    pub attempt_timeout_secs: f64,
}

impl PreflightSection {
    fn default_path() -> String {
        "/health".to_string()
    }

    fn default_poll() -> f64 {
        5.0
    }

    fn default_wait() -> f64 {
        30.0
    }

    fn default_timeout() -> f64 {
        5.0
    }
}

impl Default for PreflightSection {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Self::default_path(),
            poll_interval_secs: Self::default_poll(),
            max_total_wait_secs: Self::default_wait(),
            attempt_timeout_secs: Self::default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub backoff_secs: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_secs: DEFAULT_BACKOFF.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequirementSection {
    pub expected_status: u16,
    pub latency_bound_secs: f64,
    pub required_pass_ratio: f64,
    #[serde(default = "default_true")]
    pub enforce_latency: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestSection {
    pub name: String,
    pub method: HttpMethod,
    /// Absolute URL, or a path joined onto `base_url`.
    pub path: String,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    #[serde(default)]
    pub query: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub json: Option<toml::Value>,
}

impl ScenarioConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        let mut config: ScenarioConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SLA_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SLA_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(raw) = std::env::var("SLA_ITERATIONS") {
            self.iterations = raw
                .parse()
                .with_context(|| format!("SLA_ITERATIONS is not a number: {raw}"))?;
        }
        if let Ok(raw) = std::env::var("SLA_CONCURRENCY") {
            self.concurrency = raw
                .parse()
                .with_context(|| format!("SLA_CONCURRENCY is not a number: {raw}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.requests.is_empty() {
            bail!("scenario '{}' declares no [[request]] entries", self.name);
        }
        if self.iterations == 0 {
            bail!("scenario '{}' has iterations = 0", self.name);
        }
        if self.concurrency == 0 {
            bail!("scenario '{}' has concurrency = 0", self.name);
        }
        self.requirement()?;
        self.retry_policy()?;
        for spec in self.request_specs()? {
            spec.validate()?;
        }
        Ok(())
    }

    pub fn requirement(&self) -> Result<SlaRequirement> {
        let r = &self.requirement;
        let bound = secs(r.latency_bound_secs, "requirement.latency_bound_secs")?;
        let requirement = SlaRequirement::new(bound, r.required_pass_ratio, r.expected_status)?
            .enforce_latency(r.enforce_latency);
        Ok(requirement)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let backoff = secs(self.retry.backoff_secs, "retry.backoff_secs")?;
        Ok(RetryPolicy::new(self.retry.max_attempts, backoff)?)
    }

    /// Preflight settings, or `None` when disabled.
    pub fn preflight_config(&self) -> Result<Option<PreflightConfig>> {
        let p = &self.preflight;
        if !p.enabled {
            return Ok(None);
        }
        let config = PreflightConfig::new(self.resolve_url(&p.path))
            .poll_interval(secs(p.poll_interval_secs, "preflight.poll_interval_secs")?)
            .max_total_wait(secs(p.max_total_wait_secs, "preflight.max_total_wait_secs")?)
            .attempt_timeout(secs(p.attempt_timeout_secs, "preflight.attempt_timeout_secs")?);
        Ok(Some(config))
    }

    pub fn request_specs(&self) -> Result<Vec<RequestSpec>> {
        self.requests
            .iter()
            .map(|section| {
                let mut spec =
                    RequestSpec::new(&section.name, section.method, self.resolve_url(&section.path));
                if let Some(timeout) = section.timeout_secs {
                    let field = format!("request '{}' timeout_secs", section.name);
                    spec = spec.with_timeout(secs(timeout, &field)?);
                }
                for (key, value) in &section.query {
                    spec = spec.with_query(key, query_value(value));
                }
                for (name, value) in &section.headers {
                    spec = spec.with_header(name, value);
                }
                if let Some(json) = &section.json {
                    let body = serde_json::to_value(json).with_context(|| {
                        format!("request '{}' has a body that is not valid JSON", section.name)
                    })?;
                    spec.body = Some(RequestBody::Json(body));
                }
                Ok(spec)
            })
            .collect()
    }

    fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn secs(value: f64, field: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{field} must be a non-negative number of seconds, got {value}"))
}

fn query_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
