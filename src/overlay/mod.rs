//! Telemetry caption overlay
//!
//! A background writer samples vehicle telemetry at a fixed rate and appends
//! caption lines, aligned to the recording's elapsed time, to one sidecar
//! track per stream.

pub mod telemetry;
pub mod writer;

pub use telemetry::{TelemetryConfig, TelemetrySample, TelemetrySource};
pub use writer::OverlayWriter;
