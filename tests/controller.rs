//! Session controller scenarios over a simulated capture backend.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use subsea_recorder::capture::pipeline::{media_output_path, StreamSpec};
use subsea_recorder::{
    CaptureBackend, CaptureHandle, RecorderConfig, SessionController, SpawnError, StartError,
    StartOptions, StopError, TelemetryConfig, Termination,
};

#[derive(Default)]
struct HandleState {
    alive: AtomicBool,
    terminations: AtomicUsize,
    force: AtomicBool,
}

struct FakeHandle {
    id: String,
    media_path: PathBuf,
    state: Arc<HandleState>,
}

#[async_trait]
impl CaptureHandle for FakeHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn media_path(&self) -> &Path {
        &self.media_path
    }

    fn is_alive(&mut self) -> bool {
        self.state.alive.load(Ordering::SeqCst)
    }

    async fn terminate(&mut self, _grace: Duration) -> Termination {
        if !self.state.alive.load(Ordering::SeqCst) {
            return Termination::AlreadyExited;
        }
        self.state.terminations.fetch_add(1, Ordering::SeqCst);
        self.state.alive.store(false, Ordering::SeqCst);
        if self.state.force.load(Ordering::SeqCst) {
            Termination::Forced
        } else {
            Termination::Graceful
        }
    }
}

/// Capture backend producing in-memory handles; touches the media file so
/// artifact checks see what the real capture tool would leave behind.
#[derive(Default)]
struct FakeBackend {
    fail_ids: HashSet<String>,
    force_ids: HashSet<String>,
    launch_delay: Option<Duration>,
    handles: Mutex<Vec<(String, Arc<HandleState>)>>,
}

impl FakeBackend {
    fn failing(ids: &[&str]) -> Self {
        Self {
            fail_ids: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    fn handle_state(&self, id: &str) -> Arc<HandleState> {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .find(|(handle_id, _)| handle_id == id)
            .map(|(_, state)| state.clone())
            .expect("handle not launched")
    }

    fn launch_count(&self) -> usize {
        self.handles.lock().unwrap().len()
    }
}

/// Clonable view of a [`FakeBackend`] so tests can keep inspecting handles
/// after the backend moves into the controller.
#[derive(Clone)]
struct SharedBackend(Arc<FakeBackend>);

#[async_trait]
impl CaptureBackend for SharedBackend {
    async fn launch(
        &self,
        spec: &StreamSpec,
        output_dir: &Path,
        stamp: &str,
    ) -> Result<Box<dyn CaptureHandle>, SpawnError> {
        let backend = &self.0;
        if let Some(delay) = backend.launch_delay {
            tokio::time::sleep(delay).await;
        }
        if backend.fail_ids.contains(&spec.id) {
            return Err(SpawnError::Spawn(io::Error::new(
                io::ErrorKind::NotFound,
                "no such device",
            )));
        }

        let media_path = media_output_path(spec, output_dir, stamp);
        std::fs::write(&media_path, b"")?;

        let state = Arc::new(HandleState::default());
        state.alive.store(true, Ordering::SeqCst);
        state
            .force
            .store(backend.force_ids.contains(&spec.id), Ordering::SeqCst);
        backend
            .handles
            .lock()
            .unwrap()
            .push((spec.id.clone(), state.clone()));

        Ok(Box::new(FakeHandle {
            id: spec.id.clone(),
            media_path,
            state,
        }))
    }
}

fn stream(id: &str) -> StreamSpec {
    StreamSpec {
        id: id.to_string(),
        split_duration_secs: None,
        ..StreamSpec::default()
    }
}

fn config(dir: &TempDir, streams: Vec<StreamSpec>) -> RecorderConfig {
    RecorderConfig {
        output_dir: dir.path().to_path_buf(),
        streams,
        grace_period_secs: 1,
        overlay_rate_hz: 2,
        // nothing listens here; telemetry must degrade to defaults
        telemetry: TelemetryConfig {
            base_url: "http://127.0.0.1:9/v1/mavlink".to_string(),
            timeout_ms: 50,
        },
    }
}

fn controller(
    dir: &TempDir,
    streams: Vec<StreamSpec>,
    backend: FakeBackend,
) -> (SessionController, Arc<FakeBackend>) {
    let backend = Arc::new(backend);
    let recorder = SessionController::with_backend(
        config(dir, streams),
        Box::new(SharedBackend(backend.clone())),
    );
    (recorder, backend)
}

#[tokio::test]
async fn start_while_recording_is_rejected_and_session_untouched() {
    let dir = TempDir::new().unwrap();
    let (recorder, _backend) = controller(&dir, vec![stream("main")], FakeBackend::default());

    recorder.start(StartOptions::default()).await.unwrap();
    let before = recorder.status().await;
    assert!(before.recording);

    let err = recorder.start(StartOptions::default()).await.unwrap_err();
    assert!(matches!(err, StartError::AlreadyActive));

    let after = recorder.status().await;
    assert!(after.recording);
    assert_eq!(after.session_id, before.session_id);
    assert_eq!(after.started_at, before.started_at);

    recorder.stop().await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent_and_spares_settled_handles() {
    let dir = TempDir::new().unwrap();
    let (recorder, backend) = controller(&dir, vec![stream("main")], FakeBackend::default());

    recorder.start(StartOptions::default()).await.unwrap();
    let state = backend.handle_state("main");

    let first = recorder.stop().await.unwrap();
    assert!(first.was_recording);
    assert!(first.forced_streams.is_empty());
    assert_eq!(state.terminations.load(Ordering::SeqCst), 1);

    let second = recorder.stop().await.unwrap();
    assert!(!second.was_recording);
    assert_eq!(state.terminations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn multi_stream_start_survives_partial_failure() {
    let dir = TempDir::new().unwrap();
    let (recorder, backend) = controller(
        &dir,
        vec![stream("main"), stream("aux")],
        FakeBackend::failing(&["aux"]),
    );

    recorder.start(StartOptions::default()).await.unwrap();
    assert_eq!(backend.launch_count(), 1);

    let status = recorder.status().await;
    assert!(status.recording);
    assert_eq!(status.streams.len(), 1);
    assert_eq!(status.streams[0].id, "main");
    assert!(status.streams[0].alive);

    let report = recorder.stop().await.unwrap();
    assert!(report.was_recording);
    assert_eq!(
        backend.handle_state("main").terminations.load(Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn start_fails_when_every_stream_fails() {
    let dir = TempDir::new().unwrap();
    let (recorder, _backend) = controller(
        &dir,
        vec![stream("main"), stream("aux")],
        FakeBackend::failing(&["main", "aux"]),
    );

    let err = recorder.start(StartOptions::default()).await.unwrap_err();
    assert!(matches!(err, StartError::AllStreamsFailed));

    let status = recorder.status().await;
    assert!(!status.recording);
    assert!(status.streams.is_empty());
}

#[tokio::test]
async fn single_stream_failure_rolls_back_and_allows_retry() {
    let dir = TempDir::new().unwrap();
    let (recorder, _backend) = controller(
        &dir,
        vec![stream("main")],
        FakeBackend::failing(&["main"]),
    );

    let err = recorder.start(StartOptions::default()).await.unwrap_err();
    assert!(matches!(err, StartError::Launch(_)));

    let status = recorder.status().await;
    assert!(!status.recording);
    assert!(status.started_at.is_none());
    assert!(status.streams.is_empty());

    // recoverable failure: the very next start may proceed
    let err = recorder.start(StartOptions::default()).await.unwrap_err();
    assert!(matches!(err, StartError::Launch(_)));
}

#[tokio::test]
async fn status_self_heals_when_all_processes_die() {
    let dir = TempDir::new().unwrap();
    let (recorder, backend) = controller(&dir, vec![stream("main")], FakeBackend::default());

    recorder.start(StartOptions::default()).await.unwrap();
    backend
        .handle_state("main")
        .alive
        .store(false, Ordering::SeqCst);

    let status = recorder.status().await;
    assert!(!status.recording);
    assert!(status.started_at.is_none());
    assert!(status.streams.is_empty());

    // the dead handle is treated as absent: a fresh start succeeds
    recorder.start(StartOptions::default()).await.unwrap();
    assert!(recorder.status().await.recording);
    recorder.stop().await.unwrap();
}

#[tokio::test]
async fn stop_reports_streams_that_needed_forced_kill() {
    let dir = TempDir::new().unwrap();
    let backend = FakeBackend {
        force_ids: ["main"].iter().map(|s| s.to_string()).collect(),
        ..FakeBackend::default()
    };
    let (recorder, _backend) = controller(&dir, vec![stream("main"), stream("aux")], backend);

    recorder.start(StartOptions::default()).await.unwrap();
    let report = recorder.stop().await.unwrap();

    assert!(report.was_recording);
    assert_eq!(report.forced_streams, vec!["main".to_string()]);
    assert!(!recorder.status().await.recording);
}

#[tokio::test]
async fn concurrent_operations_are_rejected_not_queued() {
    let dir = TempDir::new().unwrap();
    let backend = FakeBackend {
        launch_delay: Some(Duration::from_millis(300)),
        ..FakeBackend::default()
    };
    let (recorder, _backend) = controller(&dir, vec![stream("main")], backend);
    let recorder = Arc::new(recorder);

    let starter = {
        let recorder = recorder.clone();
        tokio::spawn(async move { recorder.start(StartOptions::default()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // stop during the in-flight start is rejected, and status answers from
    // the snapshot instead of waiting out the launch
    let err = recorder.stop().await.unwrap_err();
    assert!(matches!(err, StopError::OperationInProgress));
    let status = recorder.status().await;
    assert!(!status.recording);

    let err = recorder.start(StartOptions::default()).await.unwrap_err();
    assert!(matches!(err, StartError::OperationInProgress));

    starter.await.unwrap().unwrap();
    assert!(recorder.status().await.recording);
    recorder.stop().await.unwrap();
}

#[tokio::test]
async fn full_session_leaves_media_and_caption_artifacts() {
    let dir = TempDir::new().unwrap();
    let (recorder, _backend) = controller(&dir, vec![stream("main")], FakeBackend::default());

    recorder.start(StartOptions::default()).await.unwrap();
    let status = recorder.status().await;
    assert!(status.recording);
    assert!(status.started_at.is_some());

    tokio::time::sleep(Duration::from_millis(1600)).await;
    recorder.stop().await.unwrap();

    let status = recorder.status().await;
    assert!(!status.recording);
    assert!(status.started_at.is_none());

    let mut media = Vec::new();
    let mut captions = Vec::new();
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let path = entry.unwrap().path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("mp4") => media.push(path),
            Some("srt") => captions.push(path),
            _ => {}
        }
    }
    assert_eq!(media.len(), 1);
    assert_eq!(captions.len(), 1);

    // ~1.6 s at 2 Hz with the first tick at t=0: expect elapsed*rate +- 1
    let track = std::fs::read_to_string(&captions[0]).unwrap();
    let blocks = track.split("\n\n").filter(|b| !b.trim().is_empty()).count();
    assert!((3..=5).contains(&blocks), "unexpected caption count {blocks}");

    // telemetry was unreachable the whole time, yet every tick wrote a line
    assert!(track.contains("Depth 0.0 m"));
}
