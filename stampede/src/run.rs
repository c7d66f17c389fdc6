//! Run assembly
//!
//! Turns a [`RunConfiguration`] into the run's phases and executes them:
//!
//! | Phase | Flow | Executor |
//! |---|---|---|
//! | `schedule_ramp_load` | [`ScheduleFlow`] | ramp up, hold, ramp down to 0 |
//! | `schedule_spike_load` | [`ScheduleFlow`] | constant, disabled at 0 workers |
//! | `schedule_complete_load` | [`ScheduleAndCompleteFlow`] | constant, disabled at 0 workers |
//! | `sse_clients` | [`StreamFlow`] | constant |
//! | `wait_and_complete_all` | [`ConvergeAndCompleteFlow`] | one iteration per worker |

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::aggregate::RunAggregate;
use crate::client::ApiClient;
use crate::config::{ConstantPhaseConfig, RunConfiguration};
use crate::error::Error;
use crate::executor::{ConstantExecutor, PerWorkerIterationsExecutor, RampingExecutor, Stage};
use crate::flow::{
    ConvergeAndCompleteFlow, Flow, ScheduleAndCompleteFlow, ScheduleFlow, SharedContext,
    StreamFlow,
};
use crate::phase::Phase;
use crate::report::RunReport;
use crate::scheduler::Scheduler;

pub const SCHEDULE_RAMP_PHASE: &str = "schedule_ramp_load";
pub const SCHEDULE_SPIKE_PHASE: &str = "schedule_spike_load";
pub const SCHEDULE_COMPLETE_PHASE: &str = "schedule_complete_load";
pub const STREAM_PHASE: &str = "sse_clients";
pub const CLEANUP_PHASE: &str = "wait_and_complete_all";

/// Cap on how long the cleanup phase may keep starting iterations.
const CLEANUP_MAX_DURATION: Duration = Duration::from_secs(600);

pub fn schedule_ramp_phase(config: &RunConfiguration) -> Phase {
    let ramp = &config.ramp;
    Phase::builder()
        .name(SCHEDULE_RAMP_PHASE)
        .flow(Arc::new(ScheduleFlow))
        .executor(Box::new(
            RampingExecutor::builder()
                .stages(vec![
                    Stage::new(ramp.ramp_up, ramp.target_workers),
                    Stage::new(ramp.hold, ramp.target_workers),
                    Stage::new(ramp.ramp_down, 0),
                ])
                .graceful_ramp_down(ramp.graceful_ramp_down)
                .build(),
        ))
        .build()
}

fn constant_phase(name: &str, phase: &ConstantPhaseConfig, flow: Arc<dyn Flow>) -> Phase {
    Phase::builder()
        .name(name)
        .start_offset(phase.start)
        .flow(flow)
        .executor(Box::new(
            ConstantExecutor::builder()
                .workers(phase.workers)
                .duration(phase.duration)
                .graceful_stop(phase.graceful_stop)
                .build(),
        ))
        .build()
}

pub fn spike_phase(config: &RunConfiguration) -> Phase {
    constant_phase(SCHEDULE_SPIKE_PHASE, &config.spike, Arc::new(ScheduleFlow))
}

pub fn schedule_complete_phase(config: &RunConfiguration) -> Phase {
    constant_phase(
        SCHEDULE_COMPLETE_PHASE,
        &config.schedule_complete,
        Arc::new(ScheduleAndCompleteFlow),
    )
}

pub fn stream_phase(config: &RunConfiguration) -> Phase {
    constant_phase(STREAM_PHASE, &config.stream.phase, Arc::new(StreamFlow))
}

/// Every cleanup worker runs once; they share a single convergence observation.
pub fn cleanup_phase(config: &RunConfiguration) -> Phase {
    let cleanup = &config.cleanup;
    Phase::builder()
        .name(CLEANUP_PHASE)
        .start_offset(cleanup.start)
        .flow(Arc::new(ConvergeAndCompleteFlow::new()))
        .executor(Box::new(
            PerWorkerIterationsExecutor::builder()
                .workers(cleanup.workers)
                .iterations(1)
                .max_duration(CLEANUP_MAX_DURATION)
                .graceful_stop(cleanup.graceful_stop)
                .build(),
        ))
        .build()
}

/// All phases of a run. Disabled phases are kept and run as no-ops.
pub fn build_phases(config: &RunConfiguration) -> Vec<Phase> {
    vec![
        schedule_ramp_phase(config),
        spike_phase(config),
        schedule_complete_phase(config),
        stream_phase(config),
        cleanup_phase(config),
    ]
}

/// Result of a finished run.
#[derive(Debug)]
pub struct RunOutcome {
    pub aggregate: RunAggregate,
    pub report: RunReport,
}

impl RunOutcome {
    pub fn thresholds_passed(&self) -> bool {
        self.report.thresholds_passed()
    }
}

#[derive(Debug, Clone)]
pub struct Run {
    config: Arc<RunConfiguration>,
    started_at: DateTime<Utc>,
}

impl Run {
    pub fn new(config: RunConfiguration) -> Self {
        Self::with_started_at(config, Utc::now())
    }

    /// A run whose stats queries count appointments from `started_at`.
    pub fn with_started_at(config: RunConfiguration, started_at: DateTime<Utc>) -> Self {
        Self {
            config: Arc::new(config),
            started_at,
        }
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn shared(&self) -> Result<SharedContext, Error> {
        let target = &self.config.target;
        let client = ApiClient::with_timeout(&target.base_url, target.request_timeout)?;
        Ok(SharedContext::new(
            Arc::clone(&self.config),
            client,
            self.started_at,
        ))
    }

    pub fn phases(&self) -> Vec<Phase> {
        build_phases(&self.config)
    }

    /// Run every phase and evaluate thresholds over the merged outcomes.
    pub async fn execute(self) -> Result<RunOutcome, Error> {
        let shared = self.shared()?;
        tracing::info!(
            base_url = shared.client().base_url(),
            started_at = %self.started_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "Run starting"
        );
        let aggregate = Scheduler::new(self.phases()).run(&shared).await;
        let report = RunReport::from(aggregate.clone()).with_thresholds(&self.config.thresholds);
        Ok(RunOutcome { aggregate, report })
    }
}
