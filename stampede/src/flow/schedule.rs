use async_trait::async_trait;
use tokio::time::Instant;

use super::{Flow, WorkerContext};
use crate::aggregate::RunAggregate;
use crate::client::{Modality, ScheduleRequest};
use crate::metric::{OperationOutcome, OutcomeStatus};

pub const SCHEDULE_TAG: &str = "schedule_appointment";
pub const SCHEDULE_CHECK: &str = "schedule accepted (200/202)";

/// Issue one create-appointment call tagged `tag` and record it.
///
/// Returns the classification and, for synchronous acceptances, the new appointment id.
pub async fn schedule_once(
    ctx: &WorkerContext,
    outcomes: &mut RunAggregate,
    tag: &str,
) -> (OutcomeStatus, Option<i64>) {
    let target = &ctx.config().target;
    let request = ScheduleRequest {
        organization_id: target.organization_id,
        clinic_id: target.clinic_id,
        patient_id: target.patient_id,
        modality: Modality::random(),
    };

    let start = Instant::now();
    let res = ctx.client().create_appointment(&request).await;
    let latency = start.elapsed();

    let (http_status, appointment_id) = match res {
        Ok(scheduled) => (scheduled.status, scheduled.appointment_id),
        Err(e) => {
            tracing::debug!(phase = ctx.phase(), worker = ctx.index(), "Schedule failed: {e}");
            (0, None)
        }
    };
    let status = OutcomeStatus::for_schedule(http_status);
    outcomes.record(OperationOutcome::new(tag, status, http_status, latency));
    outcomes.check(SCHEDULE_CHECK, status == OutcomeStatus::Success);

    (status, appointment_id)
}

/// Schedules one appointment, then pauses for `pacing.schedule_pause`.
///
/// The pause is the same whatever the outcome, backpressure included.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScheduleFlow;

#[async_trait]
impl Flow for ScheduleFlow {
    fn name(&self) -> &str {
        "schedule"
    }

    async fn run(&self, ctx: &WorkerContext, outcomes: &mut RunAggregate) {
        schedule_once(ctx, outcomes, SCHEDULE_TAG).await;
        tokio::time::sleep(ctx.config().pacing.schedule_pause).await;
    }
}
