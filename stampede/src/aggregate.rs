use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Serialize, de::DeserializeOwned};

use stampede_macros::aggregate;

use crate::latency::LatencyHistogram;
use crate::metric::{CheckOutcome, Metric, OperationOutcome, OutcomeStatus, Sample};

/// The `Aggregate` trait defines how raw [`Metric`] values are collected and combined
/// into an intermediate, mergeable representation.
///
/// Aggregates do **not** compute final statistics such as averages or percentiles; that is
/// the job of a [`crate::Report`]. They keep compact raw data (counts, latency histograms,
/// check tallies) so the report can derive accurate summaries later.
///
/// Every worker owns its own aggregate, so recording never takes a lock. When a phase
/// ends, the worker aggregates are merged in arbitrary order into one.
///
/// # Implementor notes
/// - `merge` must be **associative** and **commutative**.
/// - Keep `consume` cheap; it runs on every recorded sample.
pub trait Aggregate
where
    Self: Serialize + DeserializeOwned + PartialEq + Send + Sync + Debug + Clone,
{
    /// The metric type this aggregate summarizes.
    type Metric: Metric;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Aggregate multiple metrics into the current instance.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single metric into the aggregate.
    fn consume(&mut self, metric: &Self::Metric);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);
}

/// Raw tallies for one operation tag.
#[aggregate]
pub struct OperationStats {
    pub total: usize,
    pub successes: usize,
    pub backpressure: usize,
    pub failures: usize,
    pub latencies: LatencyHistogram,
}

impl OperationStats {
    fn consume(&mut self, outcome: &OperationOutcome) {
        self.total += 1;
        match outcome.status {
            OutcomeStatus::Success => self.successes += 1,
            OutcomeStatus::Backpressure => self.backpressure += 1,
            OutcomeStatus::Failure => self.failures += 1,
        }
        self.latencies.record(outcome.latency);
    }

    fn merge(&mut self, other: Self) {
        self.total += other.total;
        self.successes += other.successes;
        self.backpressure += other.backpressure;
        self.failures += other.failures;
        self.latencies.merge(&other.latencies);
    }
}

/// Pass/fail tallies for one named check.
#[aggregate]
pub struct CheckStats {
    pub passes: usize,
    pub fails: usize,
}

/// Append-only record of everything the flows of a run produced.
///
/// Keyed by operation tag and check name so reports come out in a stable order.
#[aggregate]
pub struct RunAggregate {
    pub operations: BTreeMap<String, OperationStats>,
    pub checks: BTreeMap<String, CheckStats>,
}

impl RunAggregate {
    /// Record the outcome of one remote call.
    pub fn record(&mut self, outcome: OperationOutcome) {
        self.consume(&Sample::Operation(outcome));
    }

    /// Record one evaluation of a named check.
    pub fn check(&mut self, name: &str, passed: bool) {
        self.consume(&Sample::Check(CheckOutcome {
            name: name.to_string(),
            passed,
        }));
    }

    pub fn operation(&self, tag: &str) -> Option<&OperationStats> {
        self.operations.get(tag)
    }

    pub fn check_stats(&self, name: &str) -> Option<&CheckStats> {
        self.checks.get(name)
    }

    /// Number of calls recorded under `tag` with the given classification.
    pub fn count(&self, tag: &str, status: OutcomeStatus) -> usize {
        self.operation(tag).map_or(0, |s| match status {
            OutcomeStatus::Success => s.successes,
            OutcomeStatus::Backpressure => s.backpressure,
            OutcomeStatus::Failure => s.failures,
        })
    }
}

impl Aggregate for RunAggregate {
    type Metric = Sample;

    fn new() -> Self {
        RunAggregate::default()
    }

    fn consume(&mut self, metric: &Self::Metric) {
        match metric {
            Sample::Operation(outcome) => self
                .operations
                .entry(outcome.operation.clone())
                .or_default()
                .consume(outcome),
            Sample::Check(check) => {
                let stats = self.checks.entry(check.name.clone()).or_default();
                if check.passed {
                    stats.passes += 1;
                } else {
                    stats.fails += 1;
                }
            }
        }
    }

    fn merge(&mut self, other: Self) {
        for (tag, stats) in other.operations {
            self.operations.entry(tag).or_default().merge(stats);
        }
        for (name, stats) in other.checks {
            let mine = self.checks.entry(name).or_default();
            mine.passes += stats.passes;
            mine.fails += stats.fails;
        }
    }
}
