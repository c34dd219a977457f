use std::sync::Arc;

use chrono::Utc;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, instrument};

use crate::{
    cases::{CaseGenerator, CombinationGenerator, TestCase},
    catalog_db::{self, CountSource},
    probe::{Probe, ProbeError, ProbeResponse},
    report::{AssertionMismatch, CaseReport, Outcome, Reporter, RunSummary, judge},
    rules::{
        RuleRegistry,
        catalog::{GAMES_PATH, GAMES_TABLE},
    },
};

/// Knobs of a matrix run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub path: String,
    /// Rules probed at the same time. Cases of one rule always run one after another.
    pub concurrency: usize,
    pub pairwise: bool,
    pub verify_idempotence: bool,
    pub require_json_body: bool,
    pub count_table: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            path: GAMES_PATH.to_string(),
            concurrency: 4,
            pairwise: false,
            verify_idempotence: false,
            require_json_body: false,
            count_table: GAMES_TABLE.to_string(),
        }
    }
}

/// Drives the registry through the generators, the probe and the reporter.
pub struct MatrixRunner {
    probe: Arc<dyn Probe>,
    registry: Arc<RuleRegistry>,
    options: RunOptions,
    counts: Option<Arc<dyn CountSource>>,
    cancel: CancellationToken,
}

impl MatrixRunner {
    pub fn new(probe: Arc<dyn Probe>, registry: Arc<RuleRegistry>, options: RunOptions) -> Self {
        Self {
            probe,
            registry,
            options,
            counts: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_count_source(mut self, source: Arc<dyn CountSource>) -> Self {
        self.counts = Some(source);
        self
    }

    /// Token that stops the run: no probe is issued once it is cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[instrument(skip_all, fields(path = %self.options.path, rules = self.registry.len()))]
    pub async fn run(&self, reporter: Arc<dyn Reporter>) -> RunSummary {
        let mut summary = RunSummary::new(Utc::now());
        let executor = CaseExecutor {
            probe: self.probe.clone(),
            reporter: reporter.clone(),
            cancel: self.cancel.clone(),
            verify_idempotence: self.options.verify_idempotence,
            require_json_body: self.options.require_json_body,
        };

        summary.merge(self.run_single_parameter(&executor).await);
        info!(cases = summary.total, "single-parameter phase finished");

        if !self.cancel.is_cancelled() {
            let cases = CombinationGenerator::new(&self.registry, &self.options.path)
                .with_pairwise(self.options.pairwise)
                .cases();
            summary.merge(executor.run_cases(cases).await);
            info!(cases = summary.total, "combination phase finished");
        }

        if let Some(source) = &self.counts {
            for rule in self.registry.rules() {
                if self.cancel.is_cancelled() {
                    break;
                }
                let check = catalog_db::cross_check(
                    self.probe.as_ref(),
                    source.clone(),
                    &self.options.count_table,
                    rule,
                    &self.options.path,
                    &self.cancel,
                )
                .await;
                if let Some(check) = check {
                    reporter.record_count(&check);
                    summary.count_checks.push(check);
                }
            }
        }

        summary.cancelled |= self.cancel.is_cancelled();
        summary.finished_at = Some(Utc::now());
        info!(
            total = summary.total,
            passed = summary.passed,
            mismatched = summary.mismatched,
            probe_errors = summary.probe_errors,
            cancelled = summary.cancelled,
            "matrix run finished"
        );
        summary
    }

    async fn run_single_parameter(&self, executor: &CaseExecutor) -> RunSummary {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for rule in self.registry.rules() {
            let rule = rule.clone();
            let path = self.options.path.clone();
            let executor = executor.clone();
            let semaphore = semaphore.clone();
            let span = info_span!("rule", parameter = rule.name());

            tasks.spawn(
                async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return RunSummary::new(Utc::now());
                    };
                    executor.run_cases(CaseGenerator::new(&rule, &path)).await
                }
                .instrument(span),
            );
        }

        let mut summary = RunSummary::new(Utc::now());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(part) => summary.merge(part),
                Err(err) => error!(error = %err, "rule task did not complete"),
            }
        }
        summary
    }
}

/// Per-task handle: executes cases in order and forwards each record to the reporter.
#[derive(Clone)]
struct CaseExecutor {
    probe: Arc<dyn Probe>,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationToken,
    verify_idempotence: bool,
    require_json_body: bool,
}

impl CaseExecutor {
    async fn run_cases(&self, cases: impl IntoIterator<Item = TestCase>) -> RunSummary {
        let mut summary = RunSummary::new(Utc::now());
        for case in cases {
            let Some(report) = self.execute(case).await else {
                summary.cancelled = true;
                break;
            };
            self.reporter.record(&report);
            summary.absorb(&report);
        }
        summary
    }

    /// `None` when the run was cancelled before the case resolved.
    async fn execute(&self, case: TestCase) -> Option<CaseReport> {
        let (outcome, observed_status, observed_body) = match self.observe(&case).await? {
            Err(err) => (Outcome::ProbeError(err.to_string()), None, None),
            Ok(response) => {
                let mut outcome = judge(&case, &response, self.require_json_body);
                if outcome.is_pass() && self.verify_idempotence {
                    match self.observe(&case).await? {
                        Ok(second) if second.status != response.status => {
                            outcome = Outcome::Mismatch(AssertionMismatch::Unstable {
                                first: response.status,
                                second: second.status,
                            });
                        }
                        Ok(_) => {}
                        Err(err) => outcome = Outcome::ProbeError(err.to_string()),
                    }
                }
                (outcome, Some(response.status), Some(response.body))
            }
        };

        Some(CaseReport {
            case,
            outcome,
            observed_status,
            observed_body,
            observed_at: Utc::now(),
        })
    }

    async fn observe(&self, case: &TestCase) -> Option<Result<ProbeResponse, ProbeError>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.probe.probe(case.path(), case.query()) => Some(result),
        }
    }
}
