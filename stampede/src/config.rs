//! Run configuration
//!
//! A [`RunConfiguration`] is resolved once at run start and shared read-only by every
//! phase, flow and the convergence poller. Nothing past this module reads the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::report::Thresholds;

/// Remote API and tenant the run targets.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetConfig {
    /// Base address without a trailing slash.
    pub base_url: String,
    pub organization_id: i64,
    pub clinic_id: i64,
    pub patient_id: i64,
    /// Upper bound on every create, complete and stats call. Streams use their own.
    pub request_timeout: Duration,
}

/// Ramp-up / hold / ramp-down schedule load.
#[derive(Debug, Clone, PartialEq)]
pub struct RampConfig {
    pub target_workers: usize,
    pub ramp_up: Duration,
    pub hold: Duration,
    pub ramp_down: Duration,
    pub graceful_ramp_down: Duration,
}

/// A phase held at a constant number of workers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPhaseConfig {
    /// 0 disables the phase.
    pub workers: usize,
    pub duration: Duration,
    pub start: Duration,
    pub graceful_stop: Duration,
}

/// Long-lived streaming clients.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub phase: ConstantPhaseConfig,
    /// How long a single connection is held before it is dropped and reopened.
    pub connection_timeout: Duration,
}

/// Convergence polling and partitioned completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupConfig {
    pub workers: usize,
    pub start: Duration,
    pub graceful_stop: Duration,
    /// When set, polling continues until the stats endpoint reports at least this many.
    pub expected_count: Option<u64>,
    pub max_polls: u32,
    pub poll_interval: Duration,
}

/// Pauses flows take to cap each worker's call rate.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingConfig {
    pub schedule_pause: Duration,
    pub complete_jitter_base: Duration,
    pub complete_jitter_spread: Duration,
    pub stream_reconnect_pause: Duration,
    pub partition_step_pause: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    pub target: TargetConfig,
    pub ramp: RampConfig,
    pub spike: ConstantPhaseConfig,
    /// Schedule-then-complete workers. Disabled by default.
    pub schedule_complete: ConstantPhaseConfig,
    pub stream: StreamConfig,
    pub cleanup: CleanupConfig,
    pub pacing: PacingConfig,
    pub thresholds: Thresholds,
}

const fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            organization_id: 1,
            clinic_id: 1,
            patient_id: 1,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            target_workers: 40,
            ramp_up: minutes(2),
            hold: minutes(3),
            ramp_down: minutes(1),
            graceful_ramp_down: Duration::from_secs(30),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            phase: ConstantPhaseConfig {
                workers: 15,
                duration: minutes(10),
                start: Duration::ZERO,
                graceful_stop: Duration::from_secs(10),
            },
            connection_timeout: minutes(5),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            start: minutes(10),
            graceful_stop: minutes(2),
            expected_count: None,
            max_polls: 60,
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            schedule_pause: Duration::from_secs(1),
            complete_jitter_base: Duration::from_millis(500),
            complete_jitter_spread: Duration::from_secs(1),
            stream_reconnect_pause: Duration::from_secs(1),
            partition_step_pause: Duration::from_millis(100),
        }
    }
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            ramp: RampConfig::default(),
            spike: ConstantPhaseConfig {
                workers: 0,
                duration: minutes(2),
                start: minutes(7),
                graceful_stop: Duration::from_secs(30),
            },
            schedule_complete: ConstantPhaseConfig {
                workers: 0,
                duration: minutes(6),
                start: Duration::ZERO,
                graceful_stop: Duration::from_secs(30),
            },
            stream: StreamConfig::default(),
            cleanup: CleanupConfig::default(),
            pacing: PacingConfig::default(),
            thresholds: Thresholds::default(),
        }
    }
}

impl RunConfiguration {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve configuration through `lookup`, starting from the defaults.
    ///
    /// Unset and empty variables keep their default; malformed ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        // Target
        if let Some(url) = var("BASE_URL") {
            config.target.base_url = normalize_base_url(&url)?;
        }
        set(&mut config.target.organization_id, parse(&var, "ORG_ID")?);
        set(&mut config.target.clinic_id, parse(&var, "CLINIC_ID")?);
        set(&mut config.target.patient_id, parse(&var, "PATIENT_ID")?);
        set(
            &mut config.target.request_timeout,
            duration(&var, "REQUEST_TIMEOUT")?,
        );

        // Ramp
        set(&mut config.ramp.target_workers, parse(&var, "RAMP_TARGET_VUS")?);
        set(&mut config.ramp.ramp_up, duration(&var, "RAMP_UP")?);
        if let Some(m) = parse::<f64, _>(&var, "RAMP_HOLD_MINUTES")? {
            config.ramp.hold = non_negative_secs("RAMP_HOLD_MINUTES", m * 60.0)?;
        }
        set(&mut config.ramp.ramp_down, duration(&var, "RAMP_DOWN")?);
        set(
            &mut config.ramp.graceful_ramp_down,
            duration(&var, "RAMP_GRACEFUL_STOP")?,
        );

        // Spike
        set(&mut config.spike.workers, parse(&var, "SPIKE_VUS")?);
        set(&mut config.spike.duration, duration(&var, "SPIKE_DURATION")?);
        set(&mut config.spike.start, duration(&var, "SPIKE_START")?);
        set(
            &mut config.spike.graceful_stop,
            duration(&var, "SPIKE_GRACEFUL_STOP")?,
        );

        // Schedule-then-complete
        set(&mut config.schedule_complete.workers, parse(&var, "COMPLETE_VUS")?);
        set(
            &mut config.schedule_complete.duration,
            duration(&var, "COMPLETE_DURATION")?,
        );
        set(
            &mut config.schedule_complete.start,
            duration(&var, "COMPLETE_START")?,
        );

        // Streaming
        set(&mut config.stream.phase.workers, parse(&var, "SSE_CLIENTS")?);
        set(&mut config.stream.phase.duration, duration(&var, "SSE_DURATION")?);
        set(
            &mut config.stream.phase.graceful_stop,
            duration(&var, "SSE_GRACEFUL_STOP")?,
        );
        set(
            &mut config.stream.connection_timeout,
            duration(&var, "SSE_TIMEOUT")?,
        );

        // Cleanup
        set(&mut config.cleanup.workers, parse(&var, "WAIT_COMPLETE_VUS")?);
        set(&mut config.cleanup.start, duration(&var, "WAIT_COMPLETE_START")?);
        set(
            &mut config.cleanup.graceful_stop,
            duration(&var, "WAIT_COMPLETE_GRACEFUL_STOP")?,
        );
        config.cleanup.expected_count = parse(&var, "EXPECTED_SCHEDULED_COUNT")?;
        set(&mut config.cleanup.max_polls, parse(&var, "STATS_MAX_POLLS")?);
        if let Some(s) = parse::<f64, _>(&var, "STATS_POLL_INTERVAL_SECONDS")? {
            config.cleanup.poll_interval = non_negative_secs("STATS_POLL_INTERVAL_SECONDS", s)?;
        }

        // Thresholds
        if let Some(rate) = parse::<f64, _>(&var, "THRESHOLD_MAX_ERROR_RATE")? {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::InvalidValue {
                    name: "THRESHOLD_MAX_ERROR_RATE".to_string(),
                    value: rate.to_string(),
                    expected: "rate between 0 and 1",
                });
            }
            config.thresholds.max_error_rate = rate;
        }
        if let Some(ms) = parse::<u64, _>(&var, "THRESHOLD_P95_MS")? {
            config.thresholds.max_p95 = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Total lifetime of the ramp curve, excluding graceful ramp-down.
    pub fn ramp_duration(&self) -> Duration {
        self.ramp.ramp_up + self.ramp.hold + self.ramp.ramp_down
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn parse<T, V>(var: &V, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    V: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value: raw.clone(),
                expected: std::any::type_name::<T>(),
            })
        })
        .transpose()
}

fn duration<V>(var: &V, name: &str) -> Result<Option<Duration>, ConfigError>
where
    V: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            parse_duration(&raw).ok_or_else(|| ConfigError::InvalidDuration {
                name: name.to_string(),
                value: raw.clone(),
            })
        })
        .transpose()
}

fn non_negative_secs(name: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: secs.to_string(),
        expected: "non-negative number",
    })
}

/// Parse `500ms`, `30s`, `2m`, `1h` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (number, unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60.0)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600.0)
    } else {
        (s, 1.0)
    };
    let value: f64 = number.trim().parse().ok()?;
    Duration::try_from_secs_f64(value * unit).ok()
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    match reqwest::Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(trimmed.to_string()),
        _ => Err(ConfigError::InvalidBaseUrl(raw.to_string())),
    }
}
