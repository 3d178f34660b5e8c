//! Rendering run reports and mapping them to exit codes.

use anyhow::Result;
use verification::SlaRunReport;

use crate::cli::OutputFormat;

/// SLA met.
pub const EXIT_PASS: u8 = 0;
/// SLA evaluated and missed, or no data.
pub const EXIT_FAIL: u8 = 1;
/// Configuration, preflight, or internal error.
pub const EXIT_ERROR: u8 = 2;

pub fn render(report: &SlaRunReport, scenario: &str, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            let mut out = format!("Scenario: {scenario}\n");
            if let Some(preflight) = &report.preflight {
                out.push_str(&format!(
                    "Preflight: ready after {} attempt(s), waited {:.1}s\n",
                    preflight.attempts,
                    preflight.waited.as_secs_f64()
                ));
            }
            let elapsed = report.finished_at - report.started_at;
            out.push_str(&format!(
                "Duration: {:.1}s\n",
                elapsed.num_milliseconds() as f64 / 1000.0
            ));
            if report.cancelled {
                out.push_str(&format!(
                    "Cancelled: {} of {} planned requests recorded\n",
                    report.verdict.total_count, report.planned
                ));
            }
            out.push('\n');
            out.push_str(&report.verdict.summary());
            Ok(out)
        }
    }
}

pub fn exit_status(report: &SlaRunReport) -> u8 {
    if report.verdict.pass {
        EXIT_PASS
    } else {
        EXIT_FAIL
    }
}
