//! Capture process handle
//!
//! Wraps one external `gst-launch-1.0` process: spawn, liveness probing,
//! graceful interrupt with a bounded grace period, and forced kill.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};

use super::pipeline::{self, StreamSpec};
use super::{CaptureBackend, CaptureHandle, Termination};
use crate::utils::error::SpawnError;

/// One running capture process
#[derive(Debug)]
pub struct CaptureProcess {
    id: String,
    media_path: PathBuf,
    child: Child,
}

impl CaptureProcess {
    /// Spawn `program` with `args` and verify it survived the launch.
    ///
    /// A process that is already dead on the first liveness check is reported
    /// as `ImmediateExit` with whatever it wrote to stderr; callers treat it
    /// the same as a spawn failure.
    pub async fn spawn(
        program: &str,
        args: &[String],
        id: &str,
        media_path: PathBuf,
    ) -> Result<Self, SpawnError> {
        tracing::info!(stream = %id, %program, ?args, "spawning capture process");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(status) = child.try_wait()? {
            let stderr = drain_stderr(&mut child).await;
            return Err(SpawnError::ImmediateExit { status, stderr });
        }

        // Keep the stderr pipe drained for the lifetime of the process so the
        // capture tool can never block on a full pipe buffer.
        if let Some(stderr) = child.stderr.take() {
            let stream = id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(stream = %stream, "{line}");
                }
            });
        }

        Ok(Self {
            id: id.to_string(),
            media_path,
            child,
        })
    }

    #[cfg(unix)]
    fn send_interrupt(&self) {
        if let Some(pid) = self.child.id() {
            // SIGINT is the end-of-stream signal: with `-e` the pipeline
            // flushes an EOS and finalizes the container before exiting.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGINT);
            }
        }
    }

    #[cfg(not(unix))]
    fn send_interrupt(&self) {
        // No graceful interrupt off unix; terminate falls through to the
        // forced path once the grace period elapses.
    }
}

#[async_trait]
impl CaptureHandle for CaptureProcess {
    fn id(&self) -> &str {
        &self.id
    }

    fn media_path(&self) -> &Path {
        &self.media_path
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self, grace: Duration) -> Termination {
        if !self.is_alive() {
            return Termination::AlreadyExited;
        }

        self.send_interrupt();
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(_) => Termination::Graceful,
            Err(_) => {
                tracing::warn!(
                    stream = %self.id,
                    grace_secs = grace.as_secs_f64(),
                    "capture process ignored interrupt, force killing"
                );
                let _ = self.child.kill().await;
                let _ = self.child.wait().await;
                Termination::Forced
            }
        }
    }
}

async fn drain_stderr(child: &mut Child) -> String {
    let Some(mut stderr) = child.stderr.take() else {
        return String::new();
    };
    let mut buf = Vec::new();
    // The process has already exited; EOF arrives as soon as the pipe drains.
    let _ = tokio::time::timeout(Duration::from_millis(250), stderr.read_to_end(&mut buf)).await;
    String::from_utf8_lossy(&buf).trim().to_string()
}

/// Production backend spawning `gst-launch-1.0` pipelines
pub struct GstLaunchBackend {
    program: String,
}

impl GstLaunchBackend {
    pub fn new() -> Self {
        Self {
            program: pipeline::GST_LAUNCH.to_string(),
        }
    }

    /// Use a different capture binary (tests, alternate installs)
    pub fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl Default for GstLaunchBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for GstLaunchBackend {
    async fn launch(
        &self,
        spec: &StreamSpec,
        output_dir: &Path,
        stamp: &str,
    ) -> Result<Box<dyn CaptureHandle>, SpawnError> {
        let media_path = pipeline::media_output_path(spec, output_dir, stamp);
        let args = pipeline::launch_args(spec, &media_path);
        let process = CaptureProcess::spawn(&self.program, &args, &spec.id, media_path).await?;
        Ok(Box::new(process))
    }
}
