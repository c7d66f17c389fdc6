use async_trait::async_trait;

use super::{Flow, WorkerContext};
use crate::aggregate::RunAggregate;
use crate::metric::{OperationOutcome, OutcomeStatus};

pub const STREAM_TAG: &str = "sse_stream";
pub const STREAM_CHECK: &str = "sse connected";

/// Holds one analytics stream open until the server closes it or the connection timeout
/// elapses, then pauses briefly. The next iteration reconnects.
///
/// The recorded latency is the time to establish the connection, not how long it was held.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamFlow;

#[async_trait]
impl Flow for StreamFlow {
    fn name(&self) -> &str {
        "stream"
    }

    async fn run(&self, ctx: &WorkerContext, outcomes: &mut RunAggregate) {
        let config = ctx.config();
        let start = tokio::time::Instant::now();
        let res = ctx
            .client()
            .open_stream(
                config.target.organization_id,
                config.target.clinic_id,
                config.stream.connection_timeout,
            )
            .await;

        let (http_status, latency) = match res {
            Ok(session) => {
                tracing::debug!(
                    worker = ctx.index(),
                    held_ms = session.held_for.as_millis() as u64,
                    bytes = session.bytes,
                    "Stream closed"
                );
                (session.status, session.connect_latency)
            }
            Err(e) => {
                tracing::debug!(worker = ctx.index(), "Stream connection failed: {e}");
                (0, start.elapsed())
            }
        };
        let status = OutcomeStatus::for_stream(http_status);
        outcomes.record(OperationOutcome::new(STREAM_TAG, status, http_status, latency));
        outcomes.check(STREAM_CHECK, status == OutcomeStatus::Success);

        tokio::time::sleep(config.pacing.stream_reconnect_pause).await;
    }
}
