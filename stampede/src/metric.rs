use std::fmt::Debug;
use std::time::Duration;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use stampede_macros::metric;

/// A `Metric` is a single observation produced by a flow.
///
/// Metrics are the most granular data the load generator records. Flows produce them,
/// an [`crate::Aggregate`] folds them into a mergeable summary, and a [`crate::Report`]
/// derives the final statistics. The core never reads its own metrics back.
///
/// ## Design principles
/// - **Comparable:** metrics support [`PartialEq`] and [`PartialOrd`] for sorting and
///   equality checks during analysis.
/// - **Thread-safe and clonable:** metrics must be `Send`, `Sync` and `Clone`.
/// - **Serializable:** metrics can be shipped elsewhere as-is.
///
/// The [`macro@stampede_macros::metric`] attribute derives everything and implements the
/// marker trait:
///
/// ```rust
/// use stampede::{Metric, macros::metric};
///
/// #[metric]
/// struct QueueDepth(u64);
/// ```
pub trait Metric
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
}

/// How a single remote call turned out.
#[derive(Serialize, Deserialize, PartialOrd, PartialEq, Eq, Debug, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    /// The server explicitly shed load. Not a failure.
    Backpressure,
    Failure,
}

impl OutcomeStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, OutcomeStatus::Failure)
    }

    /// `POST /api/appointments`: 200 (sync) and 202 (queued) are accepted, 503 is backpressure.
    pub fn for_schedule(status: u16) -> Self {
        match status {
            200 | 202 => OutcomeStatus::Success,
            503 => OutcomeStatus::Backpressure,
            _ => OutcomeStatus::Failure,
        }
    }

    /// `PATCH /api/appointments/{id}` issued right after a schedule: only 200 is expected.
    pub fn for_completion(status: u16) -> Self {
        if status == 200 {
            OutcomeStatus::Success
        } else {
            OutcomeStatus::Failure
        }
    }

    /// `PATCH /api/appointments/{id}` during cleanup: an already completed or missing
    /// appointment (404) is as good as a completed one.
    pub fn for_idempotent_completion(status: u16) -> Self {
        match status {
            200 | 404 => OutcomeStatus::Success,
            _ => OutcomeStatus::Failure,
        }
    }

    /// Streaming connections count as established for any 1xx/2xx/3xx status.
    /// Status 0 stands for a transport error.
    pub fn for_stream(status: u16) -> Self {
        if (100..400).contains(&status) {
            OutcomeStatus::Success
        } else {
            OutcomeStatus::Failure
        }
    }
}

/// One record per remote call.
#[metric]
pub struct OperationOutcome {
    /// Operation tag, e.g. `schedule_appointment`.
    pub operation: String,
    pub status: OutcomeStatus,
    /// HTTP status, or 0 when the call failed at the transport level.
    pub http_status: u16,
    pub latency: Duration,
}

impl OperationOutcome {
    pub fn new(
        operation: impl Into<String>,
        status: OutcomeStatus,
        http_status: u16,
        latency: Duration,
    ) -> Self {
        Self {
            operation: operation.into(),
            status,
            http_status,
            latency,
        }
    }
}

/// Result of evaluating one named check.
#[metric]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
}

/// Everything a flow can record.
#[metric]
pub enum Sample {
    Operation(OperationOutcome),
    Check(CheckOutcome),
}

impl From<OperationOutcome> for Sample {
    fn from(value: OperationOutcome) -> Self {
        Sample::Operation(value)
    }
}

impl From<CheckOutcome> for Sample {
    fn from(value: CheckOutcome) -> Self {
        Sample::Check(value)
    }
}
