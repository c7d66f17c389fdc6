use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Aggregate;
use crate::aggregate::{OperationStats, RunAggregate};
use crate::error::Error;
use crate::latency::LatencyHistogram;

/// A [`Report`] is the processed form of an [`Aggregate`].
///
/// Reports turn raw tallies into rates and percentiles. They are pure data, free of I/O,
/// built from an aggregate through `From<A>`, and handed to a [`Reporter`] for output.
pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

/// A [`Reporter`] consumes a [`Report`] and performs side effects: printing it, logging it,
/// sending it somewhere.
pub trait Reporter<A: Aggregate, R: Report<A>> {
    fn report(&self, report: &R) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Summary of one operation tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationReport {
    pub count: usize,
    pub successes: usize,
    pub backpressure: usize,
    pub failures: usize,
    /// Failures over all calls. Backpressure is not counted as a failure.
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
}

impl From<&OperationStats> for OperationReport {
    fn from(stats: &OperationStats) -> Self {
        Self {
            count: stats.total,
            successes: stats.successes,
            backpressure: stats.backpressure,
            failures: stats.failures,
            error_rate: ratio(stats.failures, stats.total),
            avg_latency_ms: stats.latencies.mean_ms(),
            p95_latency_ms: stats.latencies.quantile_ms(0.95),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    pub passes: usize,
    pub fails: usize,
    pub pass_rate: f64,
}

/// The outcome of evaluating one threshold against a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: f64,
    pub passed: bool,
}

/// Run-wide pass criteria: `http_req_failed rate < max_error_rate` and
/// `http_req_duration p(95) < max_p95`.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub max_error_rate: f64,
    pub max_p95: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 0.05,
            max_p95: Duration::from_secs(2),
        }
    }
}

impl Thresholds {
    pub fn evaluate(&self, report: &RunReport) -> Vec<ThresholdResult> {
        let max_p95_ms = self.max_p95.as_secs_f64() * 1000.0;
        vec![
            ThresholdResult {
                metric: "http_req_failed".to_string(),
                expression: format!("rate<{}", self.max_error_rate),
                observed: report.http_req_failed,
                passed: report.http_req_failed < self.max_error_rate,
            },
            ThresholdResult {
                metric: "http_req_duration".to_string(),
                expression: format!("p(95)<{max_p95_ms}"),
                observed: report.http_req_duration_p95_ms,
                passed: report.http_req_duration_p95_ms < max_p95_ms,
            },
        ]
    }
}

/// Final statistics of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub http_reqs: usize,
    /// Share of calls classified as failures across every operation.
    pub http_req_failed: f64,
    pub http_req_duration_avg_ms: f64,
    pub http_req_duration_p95_ms: f64,
    pub operations: BTreeMap<String, OperationReport>,
    pub checks: BTreeMap<String, CheckReport>,
    #[serde(default)]
    pub thresholds: Vec<ThresholdResult>,
}

impl RunReport {
    /// Evaluate `thresholds` and attach the results.
    pub fn with_thresholds(mut self, thresholds: &Thresholds) -> Self {
        self.thresholds = thresholds.evaluate(&self);
        self
    }

    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn checks_failed(&self) -> usize {
        self.checks.values().map(|c| c.fails).sum()
    }
}

impl From<RunAggregate> for RunReport {
    fn from(value: RunAggregate) -> Self {
        let mut all_latencies = LatencyHistogram::default();
        let mut http_reqs = 0;
        let mut failures = 0;
        for stats in value.operations.values() {
            http_reqs += stats.total;
            failures += stats.failures;
            all_latencies.merge(&stats.latencies);
        }

        Self {
            http_reqs,
            http_req_failed: ratio(failures, http_reqs),
            http_req_duration_avg_ms: all_latencies.mean_ms(),
            http_req_duration_p95_ms: all_latencies.quantile_ms(0.95),
            operations: value
                .operations
                .iter()
                .map(|(tag, stats)| (tag.clone(), OperationReport::from(stats)))
                .collect(),
            checks: value
                .checks
                .into_iter()
                .map(|(name, c)| {
                    let report = CheckReport {
                        passes: c.passes,
                        fails: c.fails,
                        pass_rate: ratio(c.passes, c.passes + c.fails),
                    };
                    (name, report)
                })
                .collect(),
            thresholds: Vec::new(),
        }
    }
}

impl Report<RunAggregate> for RunReport {}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Prints the report as pretty JSON on stdout.
pub struct StdoutReporter;

impl Reporter<RunAggregate, RunReport> for StdoutReporter {
    async fn report(&self, report: &RunReport) -> Result<(), Error> {
        let value = serde_json::to_string_pretty(report)?;
        println!("{value}");
        Ok(())
    }
}

/// Emits one structured `tracing` event per operation, check and threshold.
pub struct TracingReporter;

impl Reporter<RunAggregate, RunReport> for TracingReporter {
    async fn report(&self, report: &RunReport) -> Result<(), Error> {
        tracing::info!(
            http_reqs = report.http_reqs,
            http_req_failed = report.http_req_failed,
            p95_ms = report.http_req_duration_p95_ms,
            "Run summary"
        );
        for (tag, op) in &report.operations {
            tracing::info!(
                operation = %tag,
                count = op.count,
                successes = op.successes,
                backpressure = op.backpressure,
                failures = op.failures,
                p95_ms = op.p95_latency_ms,
                "Operation"
            );
        }
        for (name, check) in &report.checks {
            if check.fails > 0 {
                tracing::warn!(check = %name, passes = check.passes, fails = check.fails, "Check");
            } else {
                tracing::info!(check = %name, passes = check.passes, "Check");
            }
        }
        for t in &report.thresholds {
            if t.passed {
                tracing::info!(metric = %t.metric, expression = %t.expression, observed = t.observed, "Threshold passed");
            } else {
                tracing::error!(metric = %t.metric, expression = %t.expression, observed = t.observed, "Threshold crossed");
            }
        }
        Ok(())
    }
}
