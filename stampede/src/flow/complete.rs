use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{Flow, WorkerContext, schedule_once};
use crate::aggregate::RunAggregate;
use crate::metric::{OperationOutcome, OutcomeStatus};

pub const SCHEDULE_FOR_COMPLETE_TAG: &str = "schedule_for_complete";
pub const COMPLETE_TAG: &str = "complete_appointment";
pub const COMPLETE_CHECK: &str = "complete status is 200";

/// Schedules an appointment and, once it exists, completes it after a short random delay.
///
/// The delay keeps create and complete from running in lockstep across workers. Queued
/// acceptances (202) carry no id, so there is nothing to complete for them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScheduleAndCompleteFlow;

fn jitter(base: Duration, spread: Duration) -> Duration {
    if spread.is_zero() {
        return base;
    }
    base + spread.mul_f64(rand::random_range(0.0..1.0))
}

#[async_trait]
impl Flow for ScheduleAndCompleteFlow {
    fn name(&self) -> &str {
        "schedule_and_complete"
    }

    async fn run(&self, ctx: &WorkerContext, outcomes: &mut RunAggregate) {
        let pacing = &ctx.config().pacing;
        let (status, appointment_id) =
            schedule_once(ctx, outcomes, SCHEDULE_FOR_COMPLETE_TAG).await;

        if let (OutcomeStatus::Success, Some(id)) = (status, appointment_id) {
            tokio::time::sleep(jitter(
                pacing.complete_jitter_base,
                pacing.complete_jitter_spread,
            ))
            .await;

            let start = Instant::now();
            let http_status = match ctx.client().complete_appointment(id).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::debug!(appointment = id, "Complete failed: {e}");
                    0
                }
            };
            let status = OutcomeStatus::for_completion(http_status);
            outcomes.record(OperationOutcome::new(
                COMPLETE_TAG,
                status,
                http_status,
                start.elapsed(),
            ));
            outcomes.check(COMPLETE_CHECK, status == OutcomeStatus::Success);
        }

        tokio::time::sleep(pacing.schedule_pause).await;
    }
}
