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

/// Every worker runs the flow `iterations` times, unless `max_duration` runs out first.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PerWorkerIterationsExecutor {
    pub workers: usize,
    #[builder(default = 1)]
    pub iterations: usize,
    /// No new iteration starts after this much time.
    #[builder(default = Duration::from_secs(600))]
    pub max_duration: Duration,
    #[builder(default = Duration::from_secs(30))]
    pub graceful_stop: Duration,
}

#[async_trait]
impl Executor for PerWorkerIterationsExecutor {
    fn kind(&self) -> &'static str {
        "per-worker-iterations"
    }

    fn duration(&self) -> Duration {
        self.max_duration
    }

    fn graceful_stop(&self) -> Duration {
        self.graceful_stop
    }

    fn max_workers(&self) -> usize {
        self.workers
    }

    async fn exec(&self, phase: &Phase, shared: &SharedContext) -> RunAggregate {
        if self.workers == 0 || self.iterations == 0 {
            tracing::info!(phase = phase.name(), "Phase has no work, skipping");
            return RunAggregate::new();
        }

        let deadline = Instant::now() + self.max_duration;
        tracing::info!(
            "Starting {} workers for phase {}, {} iterations each",
            self.workers,
            phase.name(),
            self.iterations
        );
        let handles: Vec<_> = (1..=self.workers)
            .map(|i| {
                spawn_worker(
                    shared.worker(phase.name_arc(), i),
                    phase.flow(),
                    self.iterations,
                    deadline,
                )
            })
            .collect();

        collect_workers(phase.name(), handles, deadline + self.graceful_stop).await
    }
}

fn spawn_worker(
    ctx: WorkerContext,
    flow: Arc<dyn Flow>,
    iterations: usize,
    deadline: Instant,
) -> JoinHandle<RunAggregate> {
    tokio::spawn(async move {
        let mut agg = RunAggregate::new();
        for i in 0..iterations {
            if Instant::now() >= deadline {
                tracing::warn!(
                    phase = ctx.phase(),
                    worker = ctx.index(),
                    "Max duration reached after {i} of {iterations} iterations"
                );
                break;
            }
            flow.run(&ctx, &mut agg).await;
        }
        agg
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::*;

    fn phase(flow: Arc<dyn Flow>, executor: PerWorkerIterationsExecutor) -> Phase {
        Phase::builder()
            .name("iterations")
            .flow(flow)
            .executor(Box::new(executor))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn each_worker_runs_its_iterations() {
        let flow = SleepyFlow::new(Duration::from_millis(10));
        let executor = PerWorkerIterationsExecutor::builder()
            .workers(2)
            .iterations(3)
            .build();

        let agg = phase(flow, executor).run(&shared()).await;

        assert_eq!(passes(&agg, &worker_check(1)), 3);
        assert_eq!(passes(&agg, &worker_check(2)), 3);
        assert_eq!(passes(&agg, FINISHED), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn max_duration_caps_the_iterations() {
        let flow = SleepyFlow::new(Duration::from_millis(100));
        let executor = PerWorkerIterationsExecutor::builder()
            .workers(1)
            .iterations(100)
            .max_duration(Duration::from_millis(250))
            .build();

        let agg = phase(flow, executor).run(&shared()).await;

        assert_eq!(passes(&agg, STARTED), 3);
        assert_eq!(passes(&agg, FINISHED), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_workers_is_a_no_op() {
        let flow = SleepyFlow::new(Duration::from_millis(10));
        let executor = PerWorkerIterationsExecutor::builder().workers(0).build();

        let agg = phase(flow, executor).run(&shared()).await;
        assert_eq!(agg, RunAggregate::new());
    }
}
