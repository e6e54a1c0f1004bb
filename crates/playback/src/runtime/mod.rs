//! Process-level plumbing for the viewer:
//! - `config`: CLI configuration parsing.
//! - `telemetry`: tracing subscribers and the Prometheus recorder.
//! - `watchdog`: stall detection for the active stream.

pub mod config;
pub mod telemetry;
pub mod watchdog;

pub use config::{BackendSource, TelemetryOptions, ViewerCliArgs, ViewerConfig};
