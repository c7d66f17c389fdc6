//! Convergence polling
//!
//! After load generation stops the server may still be applying queued schedules. The
//! [`ConvergencePoller`] reads the stats endpoint until it reports the expected number of
//! appointments, or until its poll budget runs out. Running out of budget is reported as a
//! failed check, never as an error: cleanup goes on with whatever ids were observed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use crate::aggregate::RunAggregate;
use crate::client::ApiClient;
use crate::config::RunConfiguration;
use crate::metric::{OperationOutcome, OutcomeStatus};

pub const STATS_TAG: &str = "appointment_stats";
pub const STATS_CHECK: &str = "stats status is 200";
pub const CONVERGED_CHECK: &str = "all expected appointments visible in stats";

#[derive(Debug, Clone, TypedBuilder)]
pub struct ConvergencePoller {
    pub organization_id: i64,
    pub clinic_id: i64,
    /// Only appointments scheduled since this instant are counted.
    pub boundary: DateTime<Utc>,
    /// Without a target a single successful poll is enough.
    #[builder(default)]
    pub target: Option<u64>,
    #[builder(default = 60)]
    pub max_polls: u32,
    #[builder(default = Duration::from_secs(5))]
    pub poll_interval: Duration,
}

/// What the final successful poll observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Convergence {
    /// Poll attempts made, failed ones included.
    pub polls: u32,
    pub observed_count: u64,
    pub appointment_ids: Vec<i64>,
    pub target: Option<u64>,
    /// True once a successful poll satisfied the target (or any successful poll when
    /// there is no target).
    pub converged: bool,
}

/// Mutable state of one polling loop.
#[derive(Debug, Default)]
struct ConvergenceState {
    polls: u32,
    last_count: u64,
    last_ids: Vec<i64>,
}

impl ConvergencePoller {
    pub fn from_config(config: &RunConfiguration, boundary: DateTime<Utc>) -> Self {
        Self {
            organization_id: config.target.organization_id,
            clinic_id: config.target.clinic_id,
            boundary,
            target: config.cleanup.expected_count,
            max_polls: config.cleanup.max_polls,
            poll_interval: config.cleanup.poll_interval,
        }
    }

    fn satisfied(&self, observed: u64) -> bool {
        self.target.is_none_or(|t| observed >= t)
    }

    /// Poll until converged or out of budget, recording every attempt into `outcomes`.
    pub async fn poll(&self, client: &ApiClient, outcomes: &mut RunAggregate) -> Convergence {
        let mut state = ConvergenceState::default();
        let mut converged = false;

        while state.polls < self.max_polls {
            let start = Instant::now();
            let res = client
                .appointment_stats(self.organization_id, self.clinic_id, self.boundary)
                .await;
            let latency = start.elapsed();
            state.polls += 1;

            let (http_status, stats) = match res {
                Ok(r) => (r.status, r.stats),
                Err(e) => {
                    tracing::debug!("Stats poll {} failed: {e}", state.polls);
                    (0, None)
                }
            };
            let status = if http_status == 200 {
                OutcomeStatus::Success
            } else {
                OutcomeStatus::Failure
            };
            outcomes.record(OperationOutcome::new(STATS_TAG, status, http_status, latency));
            outcomes.check(STATS_CHECK, http_status == 200);

            if let Some(stats) = stats {
                state.last_count = stats.count;
                state.last_ids = stats.appointment_ids;
                tracing::debug!(
                    poll = state.polls,
                    observed = state.last_count,
                    target = ?self.target,
                    "Stats observed"
                );
                if self.satisfied(state.last_count) {
                    converged = true;
                    break;
                }
            }

            if state.polls < self.max_polls {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        if let Some(target) = self.target {
            let visible = state.last_count >= target;
            outcomes.check(CONVERGED_CHECK, visible);
            if !visible {
                tracing::warn!(
                    observed = state.last_count,
                    target,
                    polls = state.polls,
                    "Stats did not reach the expected count within the poll budget"
                );
            }
        }

        Convergence {
            polls: state.polls,
            observed_count: state.last_count,
            appointment_ids: state.last_ids,
            target: self.target,
            converged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STATS_PATH: &str = "/api/appointments/stats/by-scheduled-at";

    fn stats_body(count: u64, ids: &[i64]) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({"count": count, "appointmentIds": ids}))
    }

    fn poller(target: Option<u64>, max_polls: u32) -> ConvergencePoller {
        ConvergencePoller::builder()
            .organization_id(1)
            .clinic_id(1)
            .boundary(Utc::now())
            .target(target)
            .max_polls(max_polls)
            .poll_interval(Duration::from_millis(1))
            .build()
    }

    #[tokio::test]
    async fn no_target_polls_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STATS_PATH))
            .respond_with(stats_body(2, &[1, 2]))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let mut outcomes = RunAggregate::default();
        let result = poller(None, 10).poll(&client, &mut outcomes).await;

        assert_eq!(result.polls, 1);
        assert!(result.converged);
        assert_eq!(result.appointment_ids, vec![1, 2]);
        // no target, no assertion
        assert!(outcomes.check_stats(CONVERGED_CHECK).is_none());
    }

    #[tokio::test]
    async fn target_met_on_first_poll() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STATS_PATH))
            .respond_with(stats_body(3, &[4, 5, 6]))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let mut outcomes = RunAggregate::default();
        let result = poller(Some(3), 10).poll(&client, &mut outcomes).await;

        assert_eq!(result.polls, 1);
        assert_eq!(result.observed_count, 3);
        assert_eq!(outcomes.check_stats(CONVERGED_CHECK).unwrap().passes, 1);
    }

    #[tokio::test]
    async fn target_never_met_exhausts_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STATS_PATH))
            .respond_with(stats_body(1, &[9]))
            .expect(4)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let mut outcomes = RunAggregate::default();
        let result = poller(Some(5), 4).poll(&client, &mut outcomes).await;

        assert_eq!(result.polls, 4);
        assert!(!result.converged);
        // stale ids are still handed over for cleanup
        assert_eq!(result.appointment_ids, vec![9]);
        let assertion = outcomes.check_stats(CONVERGED_CHECK).unwrap();
        assert_eq!(assertion.fails, 1);
        assert_eq!(assertion.passes, 0);
    }

    #[tokio::test]
    async fn converges_once_the_count_catches_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STATS_PATH))
            .respond_with(stats_body(1, &[1]))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(STATS_PATH))
            .respond_with(stats_body(2, &[1, 2]))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let mut outcomes = RunAggregate::default();
        let result = poller(Some(2), 10).poll(&client, &mut outcomes).await;

        assert_eq!(result.polls, 3);
        assert!(result.converged);
        assert_eq!(result.appointment_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn non_200_consumes_budget_without_resetting() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STATS_PATH))
            .respond_with(stats_body(1, &[7]))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(STATS_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let mut outcomes = RunAggregate::default();
        let result = poller(Some(2), 3).poll(&client, &mut outcomes).await;

        assert_eq!(result.polls, 3);
        assert_eq!(result.observed_count, 1);
        assert_eq!(result.appointment_ids, vec![7]);
        assert_eq!(outcomes.count(STATS_TAG, OutcomeStatus::Failure), 2);
        assert_eq!(outcomes.check_stats(STATS_CHECK).unwrap().fails, 2);
    }

    #[tokio::test]
    async fn zero_budget_never_polls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(stats_body(1, &[1]))
            .expect(0)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let mut outcomes = RunAggregate::default();
        let result = poller(None, 0).poll(&client, &mut outcomes).await;

        assert_eq!(result.polls, 0);
        assert!(result.appointment_ids.is_empty());
        assert!(!result.converged);
    }
}
