#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use stampede::RunConfiguration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// What the fake appointment service has seen so far.
#[derive(Debug, Default)]
pub struct State {
    pub next_id: i64,
    pub created: Vec<i64>,
    /// Completion calls per appointment id, unknown ids included.
    pub completions: BTreeMap<i64, usize>,
    pub stats_polls: usize,
    /// Newest appointments hidden from the first stats polls, one fewer per poll.
    pub stats_lag: usize,
    /// Every `n`th schedule is answered with this status instead of 200.
    pub reject_every: Option<(usize, u16)>,
    pub schedules: usize,
}

/// In-memory stand-in for the appointment API, served by a wiremock [`MockServer`].
pub struct FakeApi {
    pub server: MockServer,
    pub state: Arc<Mutex<State>>,
}

struct Schedule(Arc<Mutex<State>>);
struct Complete(Arc<Mutex<State>>);
struct Stats(Arc<Mutex<State>>);

impl Respond for Schedule {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let mut state = self.0.lock().unwrap();
        state.schedules += 1;
        if let Some((n, status)) = state.reject_every {
            if state.schedules % n == 0 {
                return ResponseTemplate::new(status);
            }
        }
        state.next_id += 1;
        let id = state.next_id;
        state.created.push(id);
        ResponseTemplate::new(200).set_body_json(json!({"id": id, "status": "SCHEDULED"}))
    }
}

impl Respond for Complete {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id: i64 = match request
            .url
            .path()
            .rsplit('/')
            .next()
            .and_then(|s| s.parse().ok())
        {
            Some(id) => id,
            None => return ResponseTemplate::new(400),
        };
        let mut state = self.0.lock().unwrap();
        *state.completions.entry(id).or_default() += 1;
        if state.created.contains(&id) {
            ResponseTemplate::new(200).set_body_json(json!({"id": id, "status": "COMPLETED"}))
        } else {
            ResponseTemplate::new(404)
        }
    }
}

impl Respond for Stats {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let mut state = self.0.lock().unwrap();
        let hidden = state.stats_lag.saturating_sub(state.stats_polls);
        state.stats_polls += 1;
        let visible = state.created.len().saturating_sub(hidden);
        let ids = &state.created[..visible];
        ResponseTemplate::new(200).set_body_json(json!({"count": ids.len(), "appointmentIds": ids}))
    }
}

impl FakeApi {
    pub async fn start() -> Self {
        Self::start_with(State::default()).await
    }

    pub async fn start_with(state: State) -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(Mutex::new(state));

        Mock::given(method("POST"))
            .and(path("/api/appointments"))
            .respond_with(Schedule(Arc::clone(&state)))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path_regex(r"^/api/appointments/\d+$"))
            .respond_with(Complete(Arc::clone(&state)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/appointments/stats/by-scheduled-at"))
            .respond_with(Stats(Arc::clone(&state)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/analytics/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("event: snapshot\ndata: {}\n\n"),
            )
            .mount(&server)
            .await;

        Self { server, state }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn created(&self) -> Vec<i64> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn completions(&self) -> BTreeMap<i64, usize> {
        self.state.lock().unwrap().completions.clone()
    }

    pub fn stats_polls(&self) -> usize {
        self.state.lock().unwrap().stats_polls
    }
}

/// Every phase disabled and every pause short; tests switch on what they need.
pub fn quiet_config(base_url: &str) -> RunConfiguration {
    let mut config = RunConfiguration::default();
    config.target.base_url = base_url.to_string();

    config.ramp.target_workers = 0;
    config.ramp.ramp_up = Duration::ZERO;
    config.ramp.hold = Duration::ZERO;
    config.ramp.ramp_down = Duration::ZERO;
    config.ramp.graceful_ramp_down = Duration::from_secs(1);

    config.spike.workers = 0;
    config.spike.start = Duration::ZERO;
    config.schedule_complete.workers = 0;
    config.stream.phase.workers = 0;

    config.cleanup.workers = 0;
    config.cleanup.start = Duration::ZERO;
    config.cleanup.poll_interval = Duration::from_millis(10);
    config.cleanup.max_polls = 5;

    fast_pacing(&mut config);
    config
}

/// Pauses between iterations have no variables of their own.
pub fn fast_pacing(config: &mut RunConfiguration) {
    config.pacing.schedule_pause = Duration::from_millis(20);
    config.pacing.complete_jitter_base = Duration::from_millis(5);
    config.pacing.complete_jitter_spread = Duration::from_millis(10);
    config.pacing.stream_reconnect_pause = Duration::from_millis(20);
    config.pacing.partition_step_pause = Duration::from_millis(2);
}

/// Resolve a configuration from `vars` as if they were the environment, with short pauses.
pub fn config_from_vars(base_url: &str, vars: &[(&str, &str)]) -> RunConfiguration {
    let mut vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    vars.insert("BASE_URL".to_string(), base_url.to_string());
    let mut config = RunConfiguration::from_lookup(|name| vars.get(name).cloned()).unwrap();
    fast_pacing(&mut config);
    config
}
