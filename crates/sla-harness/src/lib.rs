//! Command-line runner for HTTP SLA checks.
//!
//! Scenarios live in TOML files (see `scenarios/`); the [`verification`]
//! crate does the actual work.
//!
//! # Usage
//!
//! ```bash
//! # Full run against a local deployment
//! sla-harness run scenarios/restaurant_search.toml
//!
//! # Point at another host, skip the health check, emit JSON
//! SLA_BASE_URL=http://staging:3000 sla-harness run scenarios/unauthorized_access.toml \
//!     --skip-preflight --format json
//!
//! # Wait for a service to come up
//! sla-harness preflight http://localhost:3000/health --max-wait-secs 60
//! ```
//!
//! Exit status: 0 when the SLA holds, 1 when it does not, 2 on any error.

pub mod cli;
pub mod commands;
pub mod config;
pub mod output;
pub mod progress;
