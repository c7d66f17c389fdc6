//! Phase scheduler
//!
//! Every [`Phase`] starts at its own offset from the beginning of the run, so phases
//! overlap freely: ramp load, the spike, streaming clients and the final cleanup are all
//! scheduled independently. The run ends once the last phase has finished, graceful stops
//! included.

use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Instant;

use crate::aggregate::{Aggregate, RunAggregate};
use crate::flow::SharedContext;
use crate::phase::Phase;

#[derive(Debug, Default)]
pub struct Scheduler {
    phases: Vec<Phase>,
}

impl Scheduler {
    pub fn new(phases: Vec<Phase>) -> Self {
        Self { phases }
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Run every phase at its offset and merge their aggregates.
    pub async fn run(self, shared: &SharedContext) -> RunAggregate {
        let run_start = Instant::now();
        tracing::info!("Scheduling {} phases", self.phases.len());

        let handles: Vec<_> = self
            .phases
            .into_iter()
            .map(|phase| {
                let phase = Arc::new(phase);
                let shared = shared.clone();
                let handle = tokio::spawn({
                    let phase = Arc::clone(&phase);
                    async move {
                        tokio::time::sleep_until(run_start + phase.start_offset()).await;
                        phase.run(&shared).await
                    }
                });
                (phase, handle)
            })
            .collect();

        let (phases, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut merged = RunAggregate::new();
        for (phase, res) in phases.iter().zip(results) {
            match res {
                Ok(agg) => merged.merge(agg),
                Err(e) => tracing::error!(phase = phase.name(), "Phase task failed: {e}"),
            }
        }
        tracing::info!(elapsed = ?run_start.elapsed(), "All phases finished");
        merged
    }
}
