//! HTTP SLA verification engine
//!
//! Issues repeated requests against a deployed service and decides whether
//! the observed behaviour meets a declared service-level agreement, such as
//! "≥ 90% of searches answer 200 within 5s" or "≥ 95% of unauthenticated
//! calls answer 401 within 2s".
//!
//! # Architecture
//!
//! ```text
//! Preflight ──ready──▶ BatchRunner ──▶ [RequestRecord] ──▶ evaluate ──▶ Verdict
//!                          │
//!                 attempt ─┼─▶ Classifier ─▶ OutcomeKind
//!                          └─▶ RetryPolicy ─▶ RetryDecision
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use verification::{ReqwestTransport, RequestSpec, SlaRequirement, SlaTest, PreflightConfig};
//!
//! let transport = Arc::new(ReqwestTransport::new()?);
//! let search = RequestSpec::get("search", "http://localhost:3000/api/restaurant/search")
//!     .with_query("cuisine", "Italian");
//! let requirement = SlaRequirement::new(Duration::from_secs(5), 0.90, 200)?;
//!
//! let report = SlaTest::new(transport, vec![search], 101, requirement)
//!     .preflight(PreflightConfig::new("http://localhost:3000/health"))
//!     .run()
//!     .await?;
//! println!("{}", report.verdict.summary());
//! ```

pub mod error;
pub mod evaluator;
pub mod harness;
pub mod outcome;
pub mod preflight;
pub mod request;
pub mod retry;
pub mod runner;
pub mod stats;
pub mod transport;

pub use error::{HarnessError, HarnessResult};
pub use evaluator::{evaluate, SlaRequirement, SpecBreakdown, Verdict, VerdictStatus};
pub use harness::{run_sla_test, SlaRunReport, SlaTest};
pub use outcome::{AttemptResult, Classifier, OutcomeKind};
pub use preflight::{PreflightConfig, PreflightReport};
pub use request::{HttpMethod, RequestBody, RequestSpec};
pub use retry::{RetryDecision, RetryPolicy};
pub use runner::{BatchOutcome, BatchRunner, ProgressObserver, RequestRecord};
pub use stats::LatencyStats;
pub use transport::{
    HttpResponse, HttpTransport, ReqwestTransport, TransportError, TransportErrorKind,
};
