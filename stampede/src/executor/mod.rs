//! Executors: how many workers a phase runs, and for how long
//!
//! An [`Executor`] drives one [`Phase`]: it spawns the phase's workers as Tokio tasks,
//! has each of them call the phase's flow over and over, and merges the worker-local
//! aggregates once every worker is done.
//!
//! Three strategies are built in:
//!
//! - [`RampingExecutor`]: worker count follows a curve of [`Stage`]s. A governor task
//!   interpolates the target count every tick; workers are pre-spawned parked and join as
//!   the curve reaches their rank, so load grows gradually instead of jumping.
//! - [`ConstantExecutor`]: a fixed number of workers for a fixed duration. Zero workers
//!   is a no-op, which is how a phase gets disabled from configuration.
//! - [`PerWorkerIterationsExecutor`]: every worker runs the flow a fixed number of times.
//!
//! # Stopping
//!
//! A deadline only stops *new* iterations. A worker always finishes the flow invocation it
//! is in, pacing included, before it retires; nothing is cancelled mid-flow. Once the
//! deadline passes the executor waits for its workers. Overrunning the graceful-stop
//! allowance is logged but the executor keeps waiting.
//!
//! # Failures
//!
//! Flows record their own failures, so a worker only dies by panicking. A panicked
//! worker is logged and contributes an empty aggregate; its siblings are unaffected.
mod constant;
mod iterations;
mod ramping;

pub use constant::ConstantExecutor;
pub use iterations::PerWorkerIterationsExecutor;
pub use ramping::{RampingExecutor, Stage, calc_target_workers};

use std::fmt::Debug;
use std::pin::pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::aggregate::{Aggregate, RunAggregate};
use crate::flow::SharedContext;
use crate::phase::Phase;

/// The runtime hook that executes a [`Phase`].
#[async_trait]
pub trait Executor: Send + Sync + Debug {
    /// Short name of the strategy, for logs.
    fn kind(&self) -> &'static str;

    /// How long new iterations may start, measured from the phase's start.
    fn duration(&self) -> Duration;

    /// How long in-flight iterations get to finish after [`Executor::duration`].
    fn graceful_stop(&self) -> Duration;

    /// Highest number of workers the phase runs at once.
    fn max_workers(&self) -> usize;

    /// Run the phase to completion and return the merged aggregate of its workers.
    async fn exec(&self, phase: &Phase, shared: &SharedContext) -> RunAggregate;
}

/// Await every worker and merge their aggregates.
///
/// Logs a warning if workers are still busy at `warn_at`, then keeps waiting.
pub(crate) async fn collect_workers(
    phase: &str,
    handles: Vec<JoinHandle<RunAggregate>>,
    warn_at: Instant,
) -> RunAggregate {
    let workers = handles.len();
    let mut joined = pin!(join_all(handles));
    let results = match tokio::time::timeout_at(warn_at, joined.as_mut()).await {
        Ok(results) => results,
        Err(_) => {
            tracing::warn!(
                phase,
                workers,
                "Graceful stop elapsed with iterations still in flight, waiting for them"
            );
            joined.await
        }
    };

    tracing::debug!("Merging results of {workers} workers for phase {phase}");
    let mut merged = RunAggregate::new();
    for res in results {
        match res {
            Ok(agg) => merged.merge(agg),
            Err(e) => {
                // one worker's data is lost, the rest still counts
                tracing::error!(phase, "Worker panicked: {e}");
            }
        }
    }
    merged
}
