use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{CaseReport, Outcome};
use crate::catalog_db::CountCheck;

/// One failed case, flattened for the JSON summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub label: String,
    pub path: String,
    pub query: String,
    pub expected: u16,
    pub observed: Option<u16>,
    pub detail: String,
}

/// Totals of a run, serialized by the CLI once the run ends.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total: usize,
    pub passed: usize,
    pub mismatched: usize,
    pub probe_errors: usize,
    pub cancelled: bool,
    pub failures: Vec<FailureRecord>,
    pub count_checks: Vec<CountCheck>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            total: 0,
            passed: 0,
            mismatched: 0,
            probe_errors: 0,
            cancelled: false,
            failures: Vec::new(),
            count_checks: Vec::new(),
        }
    }

    pub fn absorb(&mut self, report: &CaseReport) {
        self.total += 1;
        let detail = match &report.outcome {
            Outcome::Pass => {
                self.passed += 1;
                return;
            }
            Outcome::Mismatch(mismatch) => {
                self.mismatched += 1;
                mismatch.to_string()
            }
            Outcome::ProbeError(message) => {
                self.probe_errors += 1;
                message.clone()
            }
        };
        self.failures.push(FailureRecord {
            label: report.case.label().to_string(),
            path: report.case.path().to_string(),
            query: report.case.query_string(),
            expected: report.case.expected_status().as_u16(),
            observed: report.observed_status.map(|status| status.as_u16()),
            detail,
        });
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.total += other.total;
        self.passed += other.passed;
        self.mismatched += other.mismatched;
        self.probe_errors += other.probe_errors;
        self.cancelled |= other.cancelled;
        self.failures.extend(other.failures);
        self.count_checks.extend(other.count_checks);
    }

    /// True when every case passed and every count cross-check agreed.
    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self.mismatched == 0
            && self.probe_errors == 0
            && self.count_checks.iter().all(CountCheck::matches)
    }
}
