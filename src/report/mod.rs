use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    cases::TestCase,
    catalog_db::CountCheck,
    probe::{ProbeBody, ProbeResponse},
};

pub mod summary;

pub use summary::{FailureRecord, RunSummary};

/// Observed behaviour differs from the case contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssertionMismatch {
    #[error("expected status {expected}, observed {observed}")]
    Status {
        expected: StatusCode,
        observed: StatusCode,
    },
    #[error("status {status} carried a body that is not JSON")]
    BodyNotJson { status: StatusCode },
    #[error("repeated request changed status from {first} to {second}")]
    Unstable {
        first: StatusCode,
        second: StatusCode,
    },
}

/// Terminal state of one case. Every case resolves to exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Mismatch(AssertionMismatch),
    ProbeError(String),
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Compare one observation with the case contract.
///
/// `require_json` additionally demands a JSON body when the case expects `200 OK`.
pub fn judge(case: &TestCase, response: &ProbeResponse, require_json: bool) -> Outcome {
    if response.status != case.expected_status() {
        return Outcome::Mismatch(AssertionMismatch::Status {
            expected: case.expected_status(),
            observed: response.status,
        });
    }
    if require_json
        && case.expected_status() == StatusCode::OK
        && !matches!(response.body, ProbeBody::Json(_))
    {
        return Outcome::Mismatch(AssertionMismatch::BodyNotJson {
            status: response.status,
        });
    }
    Outcome::Pass
}

/// Plain-data record handed to the reporter: the case and what was observed.
#[derive(Debug, Clone)]
pub struct CaseReport {
    pub case: TestCase,
    pub outcome: Outcome,
    pub observed_status: Option<StatusCode>,
    pub observed_body: Option<ProbeBody>,
    pub observed_at: DateTime<Utc>,
}

/// Harness seam. Implementations must tolerate concurrent calls from several rule tasks.
pub trait Reporter: Send + Sync {
    fn record(&self, report: &CaseReport);

    fn record_count(&self, _check: &CountCheck) {}
}

/// Emits one structured log event per case.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn record(&self, report: &CaseReport) {
        let case = &report.case;
        let query = case.query_string();
        let expected = case.expected_status().as_u16();
        match &report.outcome {
            Outcome::Pass => info!(
                case = case.label(),
                query = query.as_str(),
                expected,
                "case passed"
            ),
            Outcome::Mismatch(mismatch) => warn!(
                case = case.label(),
                query = query.as_str(),
                expected,
                observed = report.observed_status.map(|status| status.as_u16()),
                reason = %mismatch,
                "case failed"
            ),
            Outcome::ProbeError(message) => error!(
                case = case.label(),
                query = query.as_str(),
                error = message.as_str(),
                "probe failed"
            ),
        }
    }

    fn record_count(&self, check: &CountCheck) {
        if check.matches() {
            info!(
                parameter = check.parameter.as_str(),
                value = check.value.as_str(),
                expected = check.catalog_count,
                "count cross-check passed"
            );
        } else {
            warn!(
                parameter = check.parameter.as_str(),
                value = check.value.as_str(),
                expected = check.catalog_count,
                observed = check.observed_count,
                "count cross-check failed"
            );
        }
    }
}

/// Keeps every record in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<CaseReport>>,
    counts: Mutex<Vec<CountCheck>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<CaseReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count_checks(&self) -> Vec<CountCheck> {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Reporter for MemoryReporter {
    fn record(&self, report: &CaseReport) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
    }

    fn record_count(&self, check: &CountCheck) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(check.clone());
    }
}
