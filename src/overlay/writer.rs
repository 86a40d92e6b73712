//! Overlay writer
//!
//! Background task appending one telemetry caption per tick to every track of
//! the active session. Caption windows are derived from the tick counter, so
//! consecutive windows are exactly contiguous: the end offset of tick n is
//! the start offset of tick n+1.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::telemetry::{TelemetrySample, TelemetrySource};

/// Bounded wait for the writer task to finish after the stop signal
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to the running overlay writer task
pub struct OverlayWriter {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<u64>,
}

impl OverlayWriter {
    /// Start the caption loop over `tracks`, ticking every `tick`.
    ///
    /// Tracks that cannot be opened are skipped with a warning; the session
    /// is not failed over a sidecar file.
    pub fn start(tracks: Vec<PathBuf>, telemetry: Arc<TelemetrySource>, tick: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut files = open_tracks(&tracks);
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks: u64 = 0;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        if files.is_empty() {
                            break;
                        }
                        let sample = telemetry.sample().await;
                        let block = caption_block(ticks, tick, &sample);
                        files.retain_mut(|(path, file)| {
                            match file.write_all(block.as_bytes()).and_then(|()| file.flush()) {
                                Ok(()) => true,
                                Err(e) => {
                                    tracing::warn!(track = %path.display(), "dropping overlay track: {e}");
                                    false
                                }
                            }
                        });
                        ticks += 1;
                    }
                }
            }

            tracing::debug!(ticks, "overlay writer loop finished");
            ticks
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the loop to exit after its current tick and wait it out.
    ///
    /// Once this returns no further caption writes can occur, so the caller
    /// may safely terminate the capture processes underneath the tracks.
    pub async fn stop(self) -> u64 {
        let Self {
            shutdown_tx,
            mut handle,
        } = self;
        drop(shutdown_tx);

        match tokio::time::timeout(JOIN_TIMEOUT, &mut handle).await {
            Ok(Ok(ticks)) => {
                tracing::info!(ticks, "overlay writer stopped");
                ticks
            }
            Ok(Err(e)) => {
                tracing::warn!("overlay writer task failed: {e}");
                0
            }
            Err(_) => {
                tracing::warn!("overlay writer did not stop in time, aborting");
                handle.abort();
                0
            }
        }
    }
}

fn open_tracks(tracks: &[PathBuf]) -> Vec<(PathBuf, File)> {
    tracks
        .iter()
        .filter_map(|path| {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => Some((path.clone(), file)),
                Err(e) => {
                    tracing::warn!(track = %path.display(), "cannot open overlay track: {e}");
                    None
                }
            }
        })
        .collect()
}

/// SRT caption block for tick `n`: window `[n*tick, (n+1)*tick)`.
fn caption_block(tick_index: u64, tick: Duration, sample: &TelemetrySample) -> String {
    let tick_ms = tick.as_millis() as u64;
    let start_ms = tick_index * tick_ms;
    let end_ms = start_ms + tick_ms;
    format!(
        "{}\n{} --> {}\n{}\n\n",
        tick_index + 1,
        srt_timestamp(start_ms),
        srt_timestamp(end_ms),
        caption_line(sample)
    )
}

fn caption_line(sample: &TelemetrySample) -> String {
    format!(
        "Depth {:.1} m | Climb {:+.2} m/s | Water {:.1} C | Lights {:.0}%",
        sample.depth, sample.climb_rate, sample.temperature, sample.lights_percent
    )
}

fn srt_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = ms / 60_000 % 60;
    let seconds = ms / 1000 % 60;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}
