//! Session controller
//!
//! Owns the authoritative session state and drives every transition: stream
//! launch with rollback, graceful-then-forced teardown, and the overlay
//! writer's lifecycle. All mutating operations serialize on one lock; a
//! concurrent operation is rejected, never queued.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::state::{RecorderConfig, Session, SessionState, StartOptions, StopReport};
use super::status::{self, StatusReport, StreamStatus};
use crate::capture::pipeline::{self, StreamSpec};
use crate::capture::{CaptureBackend, GstLaunchBackend, Termination};
use crate::overlay::telemetry::TelemetrySource;
use crate::overlay::OverlayWriter;
use crate::utils::error::{StartError, StopError};

/// Last state published by a completed transition or status sweep; lets
/// status queries answer without waiting behind an in-flight stop.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    state: SessionState,
    report: Option<StatusReport>,
}

impl Snapshot {
    fn to_report(&self) -> StatusReport {
        self.report.clone().unwrap_or(StatusReport {
            recording: false,
            started_at: None,
            session_id: None,
            streams: Vec::new(),
        })
    }
}

/// Manages the single recording session
pub struct SessionController {
    config: RecorderConfig,
    backend: Box<dyn CaptureBackend>,
    telemetry: Arc<TelemetrySource>,
    session: Mutex<Session>,
    snapshot: RwLock<Snapshot>,
}

impl SessionController {
    pub fn new(config: RecorderConfig) -> Self {
        Self::with_backend(config, Box::new(GstLaunchBackend::new()))
    }

    /// Create a controller over a custom capture backend
    pub fn with_backend(config: RecorderConfig, backend: Box<dyn CaptureBackend>) -> Self {
        let telemetry = Arc::new(TelemetrySource::new(&config.telemetry));
        Self {
            config,
            backend,
            telemetry,
            session: Mutex::new(Session::default()),
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// Current state as last published
    pub fn state(&self) -> SessionState {
        self.snapshot.read().state
    }

    /// Start a recording session.
    ///
    /// Rejected while a session is active or another operation is in flight.
    /// Any failure rolls back fully: streams launched before the failure are
    /// terminated and the controller returns to idle holding no resources.
    pub async fn start(&self, options: StartOptions) -> Result<(), StartError> {
        let mut session = self
            .session
            .try_lock()
            .map_err(|_| StartError::OperationInProgress)?;

        match session.state {
            SessionState::Idle | SessionState::Failed => {}
            SessionState::Recording => return Err(StartError::AlreadyActive),
            SessionState::Starting | SessionState::Stopping => {
                return Err(StartError::OperationInProgress)
            }
        }

        self.transition(&mut session, SessionState::Starting);
        match self.launch_streams(&mut session, &options).await {
            Ok(()) => {
                session.started_at = Some(Utc::now());
                session.session_id = Some(Uuid::new_v4());

                let tick = Duration::from_millis(1000 / u64::from(self.config.overlay_rate_hz.max(1)));
                let tracks = session
                    .streams
                    .iter()
                    .map(|s| pipeline::overlay_track_path(s.media_path()))
                    .collect();
                session.overlay =
                    Some(OverlayWriter::start(tracks, self.telemetry.clone(), tick));

                self.transition(&mut session, SessionState::Recording);
                tracing::info!(
                    session = %session.session_id.unwrap_or_default(),
                    streams = session.streams.len(),
                    "recording started"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("start failed, rolling back: {e}");
                self.rollback(&mut session).await;
                Err(e)
            }
        }
    }

    /// Stop the recording session.
    ///
    /// No-op success on an idle controller. The overlay writer is always
    /// joined before any capture process is signaled, so no caption write can
    /// race the container finalization. Streams that ignore the graceful
    /// interrupt are force-killed and reported, never turned into an error.
    pub async fn stop(&self) -> Result<StopReport, StopError> {
        let mut session = self
            .session
            .try_lock()
            .map_err(|_| StopError::OperationInProgress)?;

        match session.state {
            SessionState::Idle => {
                return Ok(StopReport {
                    was_recording: false,
                    forced_streams: Vec::new(),
                })
            }
            SessionState::Starting | SessionState::Stopping => {
                return Err(StopError::OperationInProgress)
            }
            SessionState::Recording | SessionState::Failed => {}
        }

        let was_recording = session.state == SessionState::Recording;
        self.transition(&mut session, SessionState::Stopping);

        if let Some(overlay) = session.overlay.take() {
            overlay.stop().await;
        }

        let grace = Duration::from_secs(self.config.grace_period_secs);
        let mut forced_streams = Vec::new();
        for handle in session.streams.iter_mut() {
            match handle.terminate(grace).await {
                Termination::Graceful => {
                    tracing::info!(stream = %handle.id(), "stream stopped gracefully");
                }
                Termination::Forced => {
                    tracing::warn!(stream = %handle.id(), "stream required forced kill");
                    forced_streams.push(handle.id().to_string());
                }
                Termination::AlreadyExited => {
                    tracing::debug!(stream = %handle.id(), "stream had already exited");
                }
            }
        }

        session.reset(SessionState::Idle);
        self.transition(&mut session, SessionState::Idle);
        tracing::info!("recording stopped");

        Ok(StopReport {
            was_recording,
            forced_streams,
        })
    }

    /// Query session status.
    ///
    /// Reconciles controller state against live process state when the
    /// session lock is free; answers from the last published snapshot when a
    /// start or stop is in flight.
    pub async fn status(&self) -> StatusReport {
        match self.session.try_lock() {
            Ok(mut session) => {
                let report = status::reconcile(&mut session).await;
                *self.snapshot.write() = Snapshot {
                    state: session.state,
                    report: Some(report.clone()),
                };
                report
            }
            Err(_) => self.snapshot.read().to_report(),
        }
    }

    async fn launch_streams(
        &self,
        session: &mut Session,
        options: &StartOptions,
    ) -> Result<(), StartError> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let specs = self.effective_specs(options);
        if specs.is_empty() {
            return Err(StartError::AllStreamsFailed);
        }

        let single = specs.len() == 1;
        let stamp = pipeline::session_stamp();
        for spec in &specs {
            match self
                .backend
                .launch(spec, &self.config.output_dir, &stamp)
                .await
            {
                Ok(handle) => session.streams.push(handle),
                Err(e) if single => return Err(StartError::Launch(e)),
                Err(e) => {
                    tracing::warn!(stream = %spec.id, "stream failed to launch, continuing without it: {e}");
                }
            }
        }

        if session.streams.is_empty() {
            return Err(StartError::AllStreamsFailed);
        }
        Ok(())
    }

    fn effective_specs(&self, options: &StartOptions) -> Vec<StreamSpec> {
        let mut specs = self.config.streams.clone();
        if let Some(mins) = options.split_duration_mins {
            for spec in specs.iter_mut().filter(|s| s.split_duration_secs.is_some()) {
                spec.split_duration_secs = Some(mins * 60);
            }
        }
        specs
    }

    /// Kill anything a failed start managed to launch; nothing is held after
    /// a start failure, so the caller may retry immediately.
    async fn rollback(&self, session: &mut Session) {
        if let Some(overlay) = session.overlay.take() {
            overlay.stop().await;
        }
        let grace = Duration::from_secs(self.config.grace_period_secs);
        for handle in session.streams.iter_mut() {
            handle.terminate(grace).await;
        }
        session.reset(SessionState::Idle);
        self.transition(session, SessionState::Idle);
    }

    fn transition(&self, session: &mut Session, state: SessionState) {
        session.state = state;
        let streams: Vec<StreamStatus> = session
            .streams
            .iter()
            .map(|s| StreamStatus {
                id: s.id().to_string(),
                // freshly published transitions believe their own bookkeeping
                alive: state == SessionState::Recording,
            })
            .collect();
        *self.snapshot.write() = Snapshot {
            state,
            report: Some(StatusReport {
                recording: state == SessionState::Recording,
                started_at: session.started_at,
                session_id: session.session_id,
                streams,
            }),
        };
    }

    /// Output directory the controller writes artifacts into
    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}
