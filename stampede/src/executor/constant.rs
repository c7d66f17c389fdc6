use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use super::{Executor, collect_workers};
use crate::aggregate::{Aggregate, RunAggregate};
use crate::flow::{Flow, SharedContext, WorkerContext};
use crate::phase::Phase;

/// A fixed number of workers looping over the flow for a fixed duration.
///
/// Zero workers makes the phase a no-op.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ConstantExecutor {
    pub workers: usize,
    pub duration: Duration,
    #[builder(default = Duration::from_secs(30))]
    pub graceful_stop: Duration,
}

#[async_trait]
impl Executor for ConstantExecutor {
    fn kind(&self) -> &'static str {
        "constant"
    }

    fn duration(&self) -> Duration {
        self.duration
    }

    fn graceful_stop(&self) -> Duration {
        self.graceful_stop
    }

    fn max_workers(&self) -> usize {
        self.workers
    }

    async fn exec(&self, phase: &Phase, shared: &SharedContext) -> RunAggregate {
        if self.workers == 0 {
            tracing::info!(phase = phase.name(), "Phase has no workers, skipping");
            return RunAggregate::new();
        }

        let deadline = Instant::now() + self.duration;
        tracing::info!(
            "Starting {} workers for phase {} over {:?}",
            self.workers,
            phase.name(),
            self.duration
        );
        let handles: Vec<_> = (1..=self.workers)
            .map(|i| spawn_worker(shared.worker(phase.name_arc(), i), phase.flow(), deadline))
            .collect();

        tokio::time::sleep_until(deadline).await;
        tracing::info!(phase = phase.name(), "Duration reached, waiting for in-flight iterations");
        collect_workers(phase.name(), handles, deadline + self.graceful_stop).await
    }
}

fn spawn_worker(
    ctx: WorkerContext,
    flow: Arc<dyn Flow>,
    deadline: Instant,
) -> JoinHandle<RunAggregate> {
    tokio::spawn(async move {
        let mut agg = RunAggregate::new();
        while Instant::now() < deadline {
            flow.run(&ctx, &mut agg).await;
        }
        agg
    })
}
