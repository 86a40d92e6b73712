//! Capture process management
//!
//! One capture stream is one external GStreamer process writing a media file.
//! The controller talks to streams through the `CaptureBackend`/`CaptureHandle`
//! traits so the process layer can be swapped out in tests.

pub mod pipeline;
pub mod process;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::utils::error::SpawnError;
use pipeline::StreamSpec;

pub use pipeline::{StreamCodec, StreamSource};
pub use process::{CaptureProcess, GstLaunchBackend};

/// How a capture process left the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process had already exited before terminate was called
    AlreadyExited,
    /// The process exited on its own within the grace period
    Graceful,
    /// The grace period elapsed and the process was killed
    Forced,
}

/// A handle to one running capture process
#[async_trait]
pub trait CaptureHandle: Send {
    /// Stream id this handle was launched for
    fn id(&self) -> &str;

    /// Media file (or split-file pattern) the process writes to
    fn media_path(&self) -> &Path;

    /// Non-blocking liveness probe; re-queries the OS on every call
    fn is_alive(&mut self) -> bool;

    /// Graceful interrupt, bounded wait, then forced kill.
    ///
    /// Idempotent: terminating an already-exited handle is a no-op success.
    /// The forced path always waits the process out, so no zombie is left
    /// behind regardless of outcome.
    async fn terminate(&mut self, grace: Duration) -> Termination;
}

/// Process-spawn seam between the controller and the OS
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Launch the capture process described by `spec`, writing into
    /// `output_dir` with the session-wide timestamp `stamp` in file names.
    async fn launch(
        &self,
        spec: &StreamSpec,
        output_dir: &Path,
        stamp: &str,
    ) -> Result<Box<dyn CaptureHandle>, SpawnError>;
}
