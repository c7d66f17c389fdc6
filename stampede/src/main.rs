use std::process::ExitCode;

use stampede::Reporter;
use stampede::config::RunConfiguration;
use stampede::report::{StdoutReporter, TracingReporter};
use stampede::run::Run;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit status when a threshold is crossed, as k6 does.
const THRESHOLDS_CROSSED: u8 = 99;
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RunConfiguration::from_env()?;
    info!(
        "Loaded configuration: base_url={}, ramp_target={}, spike={}, stream_clients={}, cleanup_workers={}",
        config.target.base_url,
        config.ramp.target_workers,
        config.spike.workers,
        config.stream.phase.workers,
        config.cleanup.workers
    );
    if config.cleanup.expected_count.is_none() {
        info!("No expected count set, cleanup completes whatever the first stats poll returns");
    }

    let run = Run::new(config);
    let outcome = tokio::select! {
        res = run.execute() => res?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning the run");
            return Ok(ExitCode::from(INTERRUPTED));
        }
    };

    TracingReporter.report(&outcome.report).await?;
    StdoutReporter.report(&outcome.report).await?;

    if outcome.thresholds_passed() {
        info!("All thresholds passed");
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Some thresholds were crossed");
        Ok(ExitCode::from(THRESHOLDS_CROSSED))
    }
}
