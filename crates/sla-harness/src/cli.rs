//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Verify that a deployed HTTP service meets its SLA
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a scenario file and evaluate its SLA
    Run(RunArgs),
    /// Poll a health endpoint until it answers 200
    Preflight(PreflightArgs),
    /// Parse and validate a scenario file without sending requests
    Validate {
        /// Path to the scenario TOML
        scenario: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Path to the scenario TOML
    pub scenario: PathBuf,

    /// Base URL for relative request paths (overrides SLA_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Iterations over the request list (overrides SLA_ITERATIONS)
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Concurrent workers (overrides SLA_CONCURRENCY)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Skip the health check even if the scenario enables it
    #[arg(long, default_value_t = false)]
    pub skip_preflight: bool,

    /// Log progress every N completed requests
    #[arg(long, default_value_t = verification::runner::DEFAULT_PROGRESS_EVERY)]
    pub progress_every: usize,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub struct PreflightArgs {
    /// Health endpoint URL
    pub url: String,

    #[arg(long, default_value_t = 5.0)]
    pub poll_interval_secs: f64,

    #[arg(long, default_value_t = 30.0)]
    pub max_wait_secs: f64,

    #[arg(long, default_value_t = 5.0)]
    pub timeout_secs: f64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags_parse() {
        let args = Args::parse_from([
            "sla-harness",
            "run",
            "scenarios/restaurant_search.toml",
            "--concurrency",
            "4",
            "--skip-preflight",
            "--format",
            "json",
        ]);
        let Command::Run(run) = args.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(run.concurrency, Some(4));
        assert!(run.skip_preflight);
        assert_eq!(run.format, OutputFormat::Json);
        assert_eq!(run.progress_every, 10);
        assert!(run.base_url.is_none());
    }

    #[test]
    fn test_preflight_defaults() {
        let args = Args::parse_from(["sla-harness", "-v", "preflight", "http://localhost:3000/health"]);
        assert!(args.verbose);
        let Command::Preflight(p) = args.command else {
            panic!("expected preflight subcommand");
        };
        assert_eq!(p.poll_interval_secs, 5.0);
        assert_eq!(p.max_wait_secs, 30.0);
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
