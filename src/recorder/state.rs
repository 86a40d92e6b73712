//! Recording session state
//!
//! Defines the session state machine, the recorder configuration, and the
//! resources owned by one session activation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::capture::pipeline::StreamSpec;
use crate::capture::CaptureHandle;
use crate::overlay::telemetry::TelemetryConfig;
use crate::overlay::OverlayWriter;

/// Current state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No recording in progress
    #[default]
    Idle,
    /// Start is launching capture processes
    Starting,
    /// At least one capture process is believed live
    Recording,
    /// Stop is tearing the session down
    Stopping,
    /// The last session ended abnormally; start is allowed again
    Failed,
}

/// Recorder configuration
///
/// Defaults mirror the standard rig: one H.264 camera on `/dev/video2`,
/// five-minute split recording, telemetry bridge on localhost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Directory receiving media files and caption sidecars
    pub output_dir: PathBuf,

    /// Streams launched by every start
    pub streams: Vec<StreamSpec>,

    /// Wait after the graceful interrupt before force-killing a stream.
    ///
    /// This is a correctness parameter, not just a timeout: the capture tool
    /// finalizes its output container only when given time to flush after the
    /// interrupt, and a kill mid-write leaves an unplayable file.
    pub grace_period_secs: u64,

    /// Overlay caption ticks per second
    pub overlay_rate_hz: u32,

    pub telemetry: TelemetryConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("videorecordings"),
            streams: vec![StreamSpec::default()],
            grace_period_secs: 5,
            overlay_rate_hz: 2,
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Per-start overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartOptions {
    /// Override the split duration of every split-enabled stream, in minutes
    pub split_duration_mins: Option<u64>,
}

/// Outcome of a stop operation
///
/// Stop reports success even when streams had to be force-killed; the
/// escalation is recorded here for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    /// False when stop was a no-op on an idle controller
    pub was_recording: bool,
    /// Ids of streams that ignored the graceful interrupt
    pub forced_streams: Vec<String>,
}

/// Resources owned by one session activation.
///
/// Mutated only inside the controller's lock-serialized transitions; created
/// at start and reset to the default at stop or self-detected failure.
#[derive(Default)]
pub struct Session {
    pub(crate) state: SessionState,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) session_id: Option<Uuid>,
    pub(crate) streams: Vec<Box<dyn CaptureHandle>>,
    pub(crate) overlay: Option<OverlayWriter>,
}

impl Session {
    /// Drop all per-activation state, returning to the idle shape
    pub(crate) fn reset(&mut self, state: SessionState) {
        self.state = state;
        self.started_at = None;
        self.session_id = None;
        self.streams.clear();
        self.overlay = None;
    }
}
