//! Worker-count ramping.
//!
//! A governor task walks through the [`Stage`]s and publishes the current target worker
//! count on a watch channel. For a stage going from `start` to `end` workers over
//! `duration`, the target at `elapsed` is the linear interpolation
//!
//! ```text
//! t      = elapsed / duration
//! target = start + (end - start) * t
//! ```
//!
//! rounded toward `start`, so the count only reaches a stage's target at the stage
//! boundary. Worker `rank` (1-based) runs while `target >= rank` and parks otherwise.
//! A worker that falls above the target mid-iteration finishes that iteration first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use super::{Executor, collect_workers};
use crate::aggregate::{Aggregate, RunAggregate};
use crate::flow::{Flow, SharedContext, WorkerContext};
use crate::phase::Phase;

/// Move the worker count to `target` over `duration`.
///
/// A zero `duration` jumps to `target` at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// Executor whose worker count follows a curve of stages.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RampingExecutor {
    pub stages: Vec<Stage>,
    /// Workers active before the first stage starts.
    #[builder(default = 0)]
    pub start_workers: usize,
    #[builder(default = Duration::from_secs(30))]
    pub graceful_ramp_down: Duration,
    /// How often the governor recomputes the target.
    #[builder(default = Duration::from_millis(100))]
    pub tick: Duration,
}

/// What the governor publishes to the workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Ramp {
    target: usize,
    done: bool,
}

#[async_trait]
impl Executor for RampingExecutor {
    fn kind(&self) -> &'static str {
        "ramping"
    }

    fn duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    fn graceful_stop(&self) -> Duration {
        self.graceful_ramp_down
    }

    fn max_workers(&self) -> usize {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_workers, usize::max)
    }

    async fn exec(&self, phase: &Phase, shared: &SharedContext) -> RunAggregate {
        let max_workers = self.max_workers();
        if max_workers == 0 {
            tracing::info!(phase = phase.name(), "No stage asks for workers, nothing to run");
            return RunAggregate::new();
        }

        let (tx, rx) = watch::channel(Ramp {
            target: self.start_workers,
            done: false,
        });

        tracing::info!("Spawning {max_workers} parked workers for phase {}", phase.name());
        let handles: Vec<_> = (1..=max_workers)
            .map(|i| {
                spawn_worker(
                    shared.worker(phase.name_arc(), i),
                    phase.flow(),
                    rx.clone(),
                )
            })
            .collect();
        drop(rx);

        governor(&tx, phase.name(), self.start_workers, &self.stages, self.tick).await;
        tx.send_modify(|r| {
            r.target = 0;
            r.done = true;
        });
        tracing::info!(phase = phase.name(), "Ramp finished, waiting for in-flight iterations");

        collect_workers(
            phase.name(),
            handles,
            Instant::now() + self.graceful_ramp_down,
        )
        .await
    }
}

/// Walk the stages, publishing the interpolated target every `tick`.
async fn governor(
    tx: &Sender<Ramp>,
    phase: &str,
    start_workers: usize,
    stages: &[Stage],
    tick: Duration,
) {
    let mut current = start_workers;
    let n = stages.len();
    for (i, stage) in stages.iter().enumerate() {
        tracing::info!(
            phase,
            "Stage {}/{n}: {current} -> {} workers over {:?}",
            i + 1,
            stage.target,
            stage.duration
        );
        if stage.duration.is_zero() {
            current = stage.target;
            publish(tx, current);
            continue;
        }

        let stage_start = Instant::now();
        let stage_end = stage_start + stage.duration;
        let mut next_tick = stage_start;
        loop {
            let elapsed = Instant::now().duration_since(stage_start);
            if elapsed >= stage.duration {
                break;
            }
            publish(
                tx,
                calc_target_workers(elapsed, stage.duration, current, stage.target),
            );
            next_tick += tick;
            tokio::time::sleep_until(next_tick.min(stage_end)).await;
        }
        // start the next stage from exactly this stage's target
        current = stage.target;
        publish(tx, current);
    }
}

fn publish(tx: &Sender<Ramp>, target: usize) {
    tx.send_if_modified(|r| {
        if r.target == target {
            false
        } else {
            r.target = target;
            true
        }
    });
}

/// Pure function computing the target worker count `elapsed` into a stage.
///
/// Rounds toward `start`: down while ramping up, up while ramping down.
pub fn calc_target_workers(
    elapsed: Duration,
    stage_duration: Duration,
    start: usize,
    end: usize,
) -> usize {
    if stage_duration.is_zero() {
        return end;
    }
    // Interpolation factor [0.0..1.0]
    let t = (elapsed.as_secs_f64() / stage_duration.as_secs_f64()).min(1.0);
    let exact = start as f64 + (end as f64 - start as f64) * t;
    let rounded = if end >= start {
        exact.floor()
    } else {
        exact.ceil()
    };
    rounded.max(0.0) as usize
}

fn spawn_worker(
    ctx: WorkerContext,
    flow: Arc<dyn Flow>,
    mut rx: Receiver<Ramp>,
) -> JoinHandle<RunAggregate> {
    tokio::spawn(async move {
        let rank = ctx.index();
        let mut agg = RunAggregate::new();

        loop {
            let ramp = match rx.wait_for(|r| r.done || r.target >= rank).await {
                Ok(r) => *r,
                Err(_) => break,
            };
            if ramp.done {
                break;
            }

            tracing::debug!(phase = ctx.phase(), "Worker {rank} active");
            loop {
                flow.run(&ctx, &mut agg).await;
                let ramp = *rx.borrow();
                if ramp.done || ramp.target < rank {
                    break;
                }
            }
            tracing::debug!(phase = ctx.phase(), "Worker {rank} parked");
        }

        tracing::debug!(phase = ctx.phase(), "Worker {rank} shutting down");
        agg
    })
}
