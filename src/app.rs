use std::time::{Duration, Instant};

use serde::Serialize;

use crate::catalog::CatalogClient;
use crate::config::RuleConfig;
use crate::download::{self, CancelFlag, DownloadOptions};
use crate::error::{DepotError, ErrorClass};
use crate::filter;
use crate::report;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// One collected rule or file failure. Nothing is thrown past the run; the
/// summary is the only error channel.
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub class: ErrorClass,
    pub message: String,
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    pub rule: usize,
    pub matched: usize,
    pub reports: Vec<String>,
    pub fetched: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub errors: Vec<RunError>,
}

impl RuleOutcome {
    fn new(rule: usize) -> Self {
        Self {
            rule,
            matched: 0,
            reports: Vec::new(),
            fetched: 0,
            skipped: 0,
            cancelled: false,
            errors: Vec::new(),
        }
    }

    fn record(&mut self, error: DepotError, destination: Option<String>) {
        self.errors.push(RunError {
            class: error.class(),
            message: error.to_string(),
            destination,
        });
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub rules: Vec<RuleOutcome>,
}

impl RunSummary {
    pub fn has_errors(&self) -> bool {
        self.rules.iter().any(|outcome| !outcome.errors.is_empty())
    }

    pub fn error_count(&self) -> usize {
        self.rules.iter().map(|outcome| outcome.errors.len()).sum()
    }

    pub fn matched_total(&self) -> usize {
        self.rules.iter().map(|outcome| outcome.matched).sum()
    }
}

#[derive(Clone)]
pub struct App<C: CatalogClient> {
    catalog: C,
}

impl<C: CatalogClient> App<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    /// Applies every rule against the catalog. Rules are independent: a
    /// failure inside one is recorded in its outcome and the remaining rules
    /// still run.
    pub fn run(
        &self,
        rules: &[RuleConfig],
        options: &DownloadOptions,
        cancel: &CancelFlag,
        sink: &dyn ProgressSink,
    ) -> RunSummary {
        let outcomes = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| self.run_rule(index, rule, options, cancel, sink))
            .collect();
        RunSummary { rules: outcomes }
    }

    fn run_rule(
        &self,
        index: usize,
        config: &RuleConfig,
        options: &DownloadOptions,
        cancel: &CancelFlag,
        sink: &dyn ProgressSink,
    ) -> RuleOutcome {
        let start = Instant::now();
        let mut outcome = RuleOutcome::new(index);

        let rule = match config.compile() {
            Ok(rule) => rule,
            Err(err) => {
                outcome.record(err, None);
                return outcome;
            }
        };

        sink.event(ProgressEvent {
            message: format!("phase=Filter; rule {index}: querying catalog"),
            elapsed: Some(start.elapsed()),
        });
        let set = match filter::filter(&self.catalog, &rule) {
            Ok(set) => set,
            Err(err) => {
                outcome.record(err, None);
                return outcome;
            }
        };
        outcome.matched = set.len();

        if let Some(path) = &rule.json_path {
            match report::write_json(&set, path) {
                Ok(()) => {
                    outcome.reports.push(path.to_string());
                    sink.event(ProgressEvent {
                        message: format!("phase=Report; rule {index}: wrote {path}"),
                        elapsed: Some(start.elapsed()),
                    });
                }
                Err(err) => outcome.record(err, Some(path.to_string())),
            }
        }
        if let Some(path) = &rule.yaml_path {
            match report::write_yaml(&set, path) {
                Ok(()) => {
                    outcome.reports.push(path.to_string());
                    sink.event(ProgressEvent {
                        message: format!("phase=Report; rule {index}: wrote {path}"),
                        elapsed: Some(start.elapsed()),
                    });
                }
                Err(err) => outcome.record(err, Some(path.to_string())),
            }
        }

        if let Some(spec) = &rule.download {
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Download; rule {index}: reconciling {} files",
                    set.len()
                ),
                elapsed: Some(start.elapsed()),
            });
            let result = download::reconcile(&self.catalog, &set, spec, options, cancel);
            outcome.fetched = result.fetched;
            outcome.skipped = result.skipped;
            outcome.cancelled = result.cancelled;
            for failure in result.errors {
                outcome.record(failure.error, Some(failure.destination.to_string()));
            }
        }

        outcome
    }
}
