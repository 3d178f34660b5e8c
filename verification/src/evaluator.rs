//! SLA evaluation.
//!
//! Turns a sequence of [`RequestRecord`]s into a [`Verdict`]. A record fails
//! the SLA when its outcome is anything other than `Success`, or (with
//! `enforce_latency`) when its elapsed time exceeds the latency bound. An
//! empty record set never passes: the verdict is marked `NoData`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::outcome::OutcomeKind;
use crate::runner::RequestRecord;
use crate::stats::LatencyStats;

/// Declared service-level agreement for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaRequirement {
    pub latency_bound: Duration,
    /// Fraction of records that must pass, in `[0, 1]`.
    pub required_pass_ratio: f64,
    pub expected_status: u16,
    /// Count slow responses as failures (default).
    #[serde(default = "default_enforce_latency")]
    pub enforce_latency: bool,
}

fn default_enforce_latency() -> bool {
    true
}

impl SlaRequirement {
    pub fn new(
        latency_bound: Duration,
        required_pass_ratio: f64,
        expected_status: u16,
    ) -> HarnessResult<Self> {
        let requirement = Self {
            latency_bound,
            required_pass_ratio,
            expected_status,
            enforce_latency: true,
        };
        requirement.validate()?;
        Ok(requirement)
    }

    pub fn enforce_latency(mut self, enforce: bool) -> Self {
        self.enforce_latency = enforce;
        self
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if !(0.0..=1.0).contains(&self.required_pass_ratio) {
            return Err(HarnessError::config(format!(
                "required_pass_ratio must be within [0, 1], got {}",
                self.required_pass_ratio
            )));
        }
        if self.latency_bound.is_zero() {
            return Err(HarnessError::config("latency_bound must be greater than 0"));
        }
        if !(100..=599).contains(&self.expected_status) {
            return Err(HarnessError::config(format!(
                "expected_status {} is not an HTTP status code",
                self.expected_status
            )));
        }
        Ok(())
    }

    /// Whether a single record counts against the SLA.
    pub fn is_violation(&self, record: &RequestRecord) -> bool {
        match record.outcome {
            OutcomeKind::Success => {
                self.enforce_latency
                    && record
                        .elapsed
                        .is_some_and(|elapsed| elapsed > self.latency_bound)
            }
            OutcomeKind::SlowResponse => self.enforce_latency,
            OutcomeKind::UnexpectedStatus
            | OutcomeKind::Timeout
            | OutcomeKind::ConnectionFailure => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Evaluated,
    /// No records to judge; the run fails closed.
    NoData,
}

/// Records and failures for one request template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecBreakdown {
    pub name: String,
    pub total: usize,
    pub failures: usize,
}

/// Pass/fail conclusion for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub pass: bool,
    pub observed_ratio: f64,
    pub required_ratio: f64,
    pub failure_count: usize,
    pub total_count: usize,
    pub latency_bound: Duration,
    pub expected_status: u16,
    pub outcome_counts: BTreeMap<OutcomeKind, usize>,
    /// Latency over records that received a response.
    pub latency: LatencyStats,
    pub by_spec: Vec<SpecBreakdown>,
    /// Failing records, in input order.
    pub violating_records: Vec<RequestRecord>,
}

impl Verdict {
    pub fn is_no_data(&self) -> bool {
        self.status == VerdictStatus::NoData
    }

    /// Format as a human-readable summary.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        let label = match (self.status, self.pass) {
            (VerdictStatus::NoData, _) => "[FAIL] no data",
            (_, true) => "[PASS]",
            (_, false) => "[FAIL]",
        };
        lines.push(format!(
            "SLA verdict {label}: {:.2}% observed vs {:.2}% required \
             ({} of {} failed; expected status {} within {:.3}s)",
            self.observed_ratio * 100.0,
            self.required_ratio * 100.0,
            self.failure_count,
            self.total_count,
            self.expected_status,
            self.latency_bound.as_secs_f64(),
        ));

        if self.is_no_data() {
            return lines.join("\n");
        }

        let counts: Vec<String> = self
            .outcome_counts
            .iter()
            .map(|(kind, count)| format!("{kind}={count}"))
            .collect();
        lines.push(format!("  outcomes: {}", counts.join(", ")));
        lines.push(format!(
            "  latency: min {:.3}s / avg {:.3}s / p50 {:.3}s / p95 {:.3}s / p99 {:.3}s / max {:.3}s",
            self.latency.min.as_secs_f64(),
            self.latency.avg.as_secs_f64(),
            self.latency.p50.as_secs_f64(),
            self.latency.p95.as_secs_f64(),
            self.latency.p99.as_secs_f64(),
            self.latency.max.as_secs_f64(),
        ));

        if self.by_spec.len() > 1 {
            for spec in &self.by_spec {
                lines.push(format!(
                    "  {}: {} of {} failed",
                    spec.name, spec.failures, spec.total
                ));
            }
        }

        if !self.violating_records.is_empty() {
            lines.push(String::new());
            lines.push("Violations:".to_string());
            for record in &self.violating_records {
                lines.push(format!(
                    "  #{} {} {} [{} attempt(s)]: {}",
                    record.sequence,
                    record.method,
                    record.spec_name,
                    record.attempts,
                    record.reason(),
                ));
            }
        }

        lines.join("\n")
    }
}

/// Evaluate records against a requirement.
pub fn evaluate(records: &[RequestRecord], requirement: &SlaRequirement) -> Verdict {
    let mut outcome_counts = BTreeMap::new();
    let mut by_spec: Vec<SpecBreakdown> = Vec::new();
    let mut violating_records = Vec::new();

    for record in records {
        *outcome_counts.entry(record.outcome).or_insert(0) += 1;

        let violation = requirement.is_violation(record);
        if violation {
            violating_records.push(record.clone());
        }

        match by_spec.iter_mut().find(|s| s.name == record.spec_name) {
            Some(entry) => {
                entry.total += 1;
                entry.failures += usize::from(violation);
            }
            None => by_spec.push(SpecBreakdown {
                name: record.spec_name.clone(),
                total: 1,
                failures: usize::from(violation),
            }),
        }
    }

    let total_count = records.len();
    let failure_count = violating_records.len();
    let latency = LatencyStats::from_samples(
        records
            .iter()
            .filter(|r| r.status.is_some())
            .filter_map(|r| r.elapsed),
    );

    let (status, observed_ratio, pass) = if total_count == 0 {
        (VerdictStatus::NoData, 0.0, false)
    } else {
        let ratio = (total_count - failure_count) as f64 / total_count as f64;
        (
            VerdictStatus::Evaluated,
            ratio,
            ratio >= requirement.required_pass_ratio,
        )
    };

    Verdict {
        status,
        pass,
        observed_ratio,
        required_ratio: requirement.required_pass_ratio,
        failure_count,
        total_count,
        latency_bound: requirement.latency_bound,
        expected_status: requirement.expected_status,
        outcome_counts,
        latency,
        by_spec,
        violating_records,
    }
}
