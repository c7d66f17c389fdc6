use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use super::{Flow, WorkerContext};
use crate::aggregate::RunAggregate;
use crate::converge::{Convergence, ConvergencePoller};
use crate::metric::{OperationOutcome, OutcomeStatus};
use crate::partition::PartitionPlan;

pub const COMPLETE_FROM_STATS_TAG: &str = "complete_from_stats";
pub const COMPLETE_FROM_STATS_CHECK: &str = "complete status is 200 or 404";

/// Complete every appointment in `ids`, in order.
///
/// A 404 counts as done: the appointment was already completed or never made it.
pub async fn complete_partition(ctx: &WorkerContext, ids: &[i64], outcomes: &mut RunAggregate) {
    let pause = ctx.config().pacing.partition_step_pause;
    for (i, &id) in ids.iter().enumerate() {
        let start = Instant::now();
        let http_status = match ctx.client().complete_appointment(id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(worker = ctx.index(), appointment = id, "Complete failed: {e}");
                0
            }
        };
        let status = OutcomeStatus::for_idempotent_completion(http_status);
        outcomes.record(OperationOutcome::new(
            COMPLETE_FROM_STATS_TAG,
            status,
            http_status,
            start.elapsed(),
        ));
        outcomes.check(COMPLETE_FROM_STATS_CHECK, status == OutcomeStatus::Success);

        if i + 1 < ids.len() {
            tokio::time::sleep(pause).await;
        }
    }
}

/// Cleanup flow: wait for the stats endpoint to converge, then complete this worker's
/// share of the observed appointments.
///
/// The first worker to arrive runs the poller; the others wait for its observation. Every
/// worker then takes the slice matching its index, so no appointment is completed twice.
/// One instance observes once; build a fresh flow for every cleanup phase.
#[derive(Debug, Default)]
pub struct ConvergeAndCompleteFlow {
    observation: OnceCell<Convergence>,
}

impl ConvergeAndCompleteFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared observation, if a worker already polled.
    pub fn observation(&self) -> Option<&Convergence> {
        self.observation.get()
    }
}

#[async_trait]
impl Flow for ConvergeAndCompleteFlow {
    fn name(&self) -> &str {
        "converge_and_complete"
    }

    async fn run(&self, ctx: &WorkerContext, outcomes: &mut RunAggregate) {
        let poll_outcomes = &mut *outcomes;
        let convergence = self
            .observation
            .get_or_init(|| async move {
                let poller =
                    ConvergencePoller::from_config(ctx.config(), ctx.shared().started_at());
                tracing::info!(
                    worker = ctx.index(),
                    target = ?poller.target,
                    max_polls = poller.max_polls,
                    "Waiting for stats to converge"
                );
                poller.poll(ctx.client(), poll_outcomes).await
            })
            .await;

        let ids = &convergence.appointment_ids;
        let plan = PartitionPlan::new(ids.len(), ctx.config().cleanup.workers);
        let slice = plan.slice(ids, ctx.index().saturating_sub(1));
        tracing::info!(
            worker = ctx.index(),
            observed = ids.len(),
            assigned = slice.len(),
            "Completing partition"
        );

        complete_partition(ctx, slice, outcomes).await;
    }
}
