//! Flow library
//!
//! A [`Flow`] is one simulated user action: a short sequence of dependent remote calls,
//! each recorded as an [`crate::metric::OperationOutcome`] plus a named check, followed by
//! the flow's own pacing pause. Executors call a phase's flow over and over on each of its
//! workers.
//!
//! Flows never return errors. A failed call is recorded and the flow moves on, so one
//! worker's trouble never reaches another worker.
mod cleanup;
mod complete;
mod schedule;
mod stream;

pub use cleanup::{
    COMPLETE_FROM_STATS_CHECK, COMPLETE_FROM_STATS_TAG, ConvergeAndCompleteFlow,
    complete_partition,
};
pub use complete::{
    COMPLETE_CHECK, COMPLETE_TAG, SCHEDULE_FOR_COMPLETE_TAG, ScheduleAndCompleteFlow,
};
pub use schedule::{SCHEDULE_CHECK, SCHEDULE_TAG, ScheduleFlow, schedule_once};
pub use stream::{STREAM_CHECK, STREAM_TAG, StreamFlow};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::aggregate::RunAggregate;
use crate::client::ApiClient;
use crate::config::RunConfiguration;

/// Read-only state every worker of a run shares.
#[derive(Debug, Clone)]
pub struct SharedContext {
    config: Arc<RunConfiguration>,
    client: ApiClient,
    started_at: DateTime<Utc>,
}

impl SharedContext {
    pub fn new(config: Arc<RunConfiguration>, client: ApiClient, started_at: DateTime<Utc>) -> Self {
        Self {
            config,
            client,
            started_at,
        }
    }

    /// Context for worker `index` (1-based) of `phase`.
    pub fn worker(&self, phase: &Arc<str>, index: usize) -> WorkerContext {
        WorkerContext {
            phase: Arc::clone(phase),
            index,
            shared: self.clone(),
        }
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Logical start of the run. Stats queries only look at appointments scheduled since.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// What a flow invocation knows about the worker running it.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    phase: Arc<str>,
    index: usize,
    shared: SharedContext,
}

impl WorkerContext {
    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// 1-based, unique within the phase.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn config(&self) -> &RunConfiguration {
        self.shared.config()
    }

    pub fn client(&self) -> &ApiClient {
        self.shared.client()
    }

    pub fn shared(&self) -> &SharedContext {
        &self.shared
    }
}

/// One repeatable unit of simulated user behavior.
#[async_trait]
pub trait Flow: Send + Sync {
    fn name(&self) -> &str;

    /// Run the flow once, recording every call and check into `outcomes`.
    async fn run(&self, ctx: &WorkerContext, outcomes: &mut RunAggregate);
}
