use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::aggregate::RunAggregate;
use crate::executor::Executor;
use crate::flow::{Flow, SharedContext};

/// A named workload: which flow to run, how to drive it, and when to start relative to
/// the beginning of the run.
#[derive(TypedBuilder)]
pub struct Phase {
    #[builder(setter(into))]
    name: Arc<str>,
    #[builder(default)]
    start_offset: Duration,
    flow: Arc<dyn Flow>,
    executor: Box<dyn Executor>,
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field("start_offset", &self.start_offset)
            .field("flow", &self.flow.name())
            .field("executor", &self.executor)
            .finish()
    }
}

impl Phase {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    pub fn start_offset(&self) -> Duration {
        self.start_offset
    }

    pub fn flow(&self) -> Arc<dyn Flow> {
        Arc::clone(&self.flow)
    }

    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    /// Duration plus graceful stop.
    pub fn total_duration(&self) -> Duration {
        self.executor.duration() + self.executor.graceful_stop()
    }

    /// Offsets from the start of the run during which the phase may have iterations in
    /// flight.
    pub fn deadline_window(&self) -> Range<Duration> {
        self.start_offset..self.start_offset + self.total_duration()
    }

    pub async fn run(&self, shared: &SharedContext) -> RunAggregate {
        tracing::info!(
            phase = self.name(),
            flow = self.flow.name(),
            executor = self.executor.kind(),
            max_workers = self.executor.max_workers(),
            "Phase starting"
        );
        let agg = self.executor.exec(self, shared).await;
        tracing::info!(phase = self.name(), "Phase finished");
        agg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ConstantExecutor;
    use crate::executor::test_support::SleepyFlow;

    #[test]
    fn deadline_window_covers_the_graceful_stop() {
        let phase = Phase::builder()
            .name("spike")
            .start_offset(Duration::from_secs(420))
            .flow(SleepyFlow::new(Duration::ZERO))
            .executor(Box::new(
                ConstantExecutor::builder()
                    .workers(10)
                    .duration(Duration::from_secs(120))
                    .graceful_stop(Duration::from_secs(30))
                    .build(),
            ))
            .build();

        assert_eq!(phase.total_duration(), Duration::from_secs(150));
        assert_eq!(
            phase.deadline_window(),
            Duration::from_secs(420)..Duration::from_secs(570)
        );
        assert_eq!(phase.executor().max_workers(), 10);
    }
}
