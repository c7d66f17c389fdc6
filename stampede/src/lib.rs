//! Stampede: phased virtual-user load generation for the appointment scheduling API.
//!
//! A run is a set of [`Phase`]s, each with its own start offset, worker count curve and
//! [`Flow`]. Phases overlap freely: schedule load ramps up and down while a spike hits the
//! service mid-run and long-lived analytics streams stay connected throughout. Once load
//! stops, a cleanup phase waits for the stats endpoint to catch up with the queued
//! schedules and completes every appointment the run created, split across its workers.
//!
//! # Architecture
//!
//! - [`Scheduler`]: starts every phase at its offset and merges what they produced.
//! - [`Executor`]: decides how many workers a phase runs and when they stop. Workers are
//!   Tokio tasks that call the phase's flow in a loop.
//! - [`Flow`]: one simulated user action, recorded as [`metric::OperationOutcome`]s and
//!   named checks.
//! - [`Aggregate`]: worker-local tallies of those outcomes, merged after each phase.
//! - [`Report`] / [`Reporter`]: rates, percentiles and threshold verdicts, and where they
//!   go.
//!
//! Remote failures never abort a run. They become failure outcomes, and the report's
//! thresholds decide whether the run passed.
//!
//! # Feature flags
//!
//! - `macros`: re-exports the `#[metric]` and `#[aggregate]` attributes as
//!   `stampede::macros` for custom metric and aggregate types. (Enabled by default)
//!
//! # Example
//!
//! ```no_run
//! use stampede::{Reporter, RunConfiguration, report::StdoutReporter, run::Run};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stampede::Error> {
//!     let config = RunConfiguration::from_env()?;
//!     let outcome = Run::new(config).execute().await?;
//!     StdoutReporter.report(&outcome.report).await?;
//!     Ok(())
//! }
//! ```

/// Worker-local outcome tallies
pub mod aggregate;
/// HTTP client for the appointment API
pub mod client;
pub mod config;
pub mod converge;
pub mod error;
/// Strategies that drive a phase's workers
pub mod executor;
pub mod flow;
pub mod latency;
/// Single outcomes
pub mod metric;
/// Splitting observed ids between cleanup workers
pub mod partition;
pub mod phase;
/// Reports, thresholds and reporters
pub mod report;
pub mod run;
pub mod scheduler;

pub use aggregate::Aggregate;
pub use config::RunConfiguration;
pub use error::Error;
pub use executor::Executor;
pub use flow::Flow;
pub use metric::Metric;
pub use phase::Phase;
pub use report::{Report, Reporter};
pub use scheduler::Scheduler;

#[cfg(feature = "macros")]
/// Procedural macros to reduce boilerplate
pub mod macros {
    pub use stampede_macros::*;
}
