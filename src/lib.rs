//! subsea-recorder - managed camera recording sessions for subsea rigs.
//!
//! Supervises external GStreamer capture processes as a single recording
//! session and decorates each recording with a telemetry caption sidecar.
//! The transport layer on top of this crate is expected to be a thin HTTP
//! shim; everything here is transport-independent.

pub mod capture;
pub mod overlay;
pub mod recorder;
pub mod utils;

pub use capture::{CaptureBackend, CaptureHandle, Termination};
pub use overlay::{TelemetryConfig, TelemetrySample, TelemetrySource};
pub use recorder::{
    RecorderConfig, SessionController, SessionState, StartOptions, StatusReport, StopReport,
};
pub use utils::error::{ControlResponse, SpawnError, StartError, StopError};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for binaries embedding the recorder
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "subsea_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
