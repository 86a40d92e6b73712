//! GStreamer pipeline construction
//!
//! Builds the `gst-launch-1.0` invocation for a stream specification and
//! derives the on-disk names of the media file and its caption sidecar.

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Default capture binary
pub const GST_LAUNCH: &str = "gst-launch-1.0";

/// Where a stream's frames come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum StreamSource {
    /// Local V4L2 device node
    Device { path: String },
    /// RTSP network source
    Network { url: String },
}

impl Default for StreamSource {
    fn default() -> Self {
        Self::Device {
            path: "/dev/video2".to_string(),
        }
    }
}

/// Encoding already produced by the camera; the pipeline only parses and muxes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamCodec {
    #[default]
    H264,
    Mjpeg,
}

impl StreamCodec {
    /// Caps filter for a device source
    pub fn caps(&self, width: u32, height: u32, framerate: u32) -> String {
        match self {
            StreamCodec::H264 => format!(
                "video/x-h264,width={width},height={height},framerate={framerate}/1"
            ),
            StreamCodec::Mjpeg => format!(
                "image/jpeg,width={width},height={height},framerate={framerate}/1"
            ),
        }
    }

    /// Parser element between source and muxer
    pub fn parse_element(&self) -> &'static str {
        match self {
            StreamCodec::H264 => "h264parse",
            StreamCodec::Mjpeg => "jpegparse",
        }
    }

    /// RTP depayloader for a network source
    pub fn depay_element(&self) -> &'static str {
        match self {
            StreamCodec::H264 => "rtph264depay",
            StreamCodec::Mjpeg => "rtpjpegdepay",
        }
    }

    /// Container muxer for single-file output
    pub fn muxer(&self) -> &'static str {
        match self {
            StreamCodec::H264 => "mp4mux",
            StreamCodec::Mjpeg => "matroskamux",
        }
    }

    /// Output container extension
    pub fn extension(&self) -> &'static str {
        match self {
            StreamCodec::H264 => "mp4",
            StreamCodec::Mjpeg => "mkv",
        }
    }
}

/// Specification of one capture stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSpec {
    /// Stream id; appears in file names and status reports
    pub id: String,

    pub source: StreamSource,

    pub codec: StreamCodec,

    pub width: u32,
    pub height: u32,
    pub framerate: u32,

    /// Rotate the output container every this many seconds; `None` records
    /// into a single file
    pub split_duration_secs: Option<u64>,
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self {
            id: "main".to_string(),
            source: StreamSource::default(),
            codec: StreamCodec::default(),
            width: 1920,
            height: 1080,
            framerate: 30,
            split_duration_secs: Some(300),
        }
    }
}

/// Session-wide timestamp used in every file name of one recording
pub fn session_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Media output path for a stream.
///
/// Split recordings get a `_%03d` sequence placeholder that splitmuxsink
/// expands per fragment.
pub fn media_output_path(spec: &StreamSpec, output_dir: &Path, stamp: &str) -> PathBuf {
    let base = format!("video_{}_{}", spec.id, stamp);
    let name = if spec.split_duration_secs.is_some() {
        format!("{base}_%03d.{}", spec.codec.extension())
    } else {
        format!("{base}.{}", spec.codec.extension())
    };
    output_dir.join(name)
}

/// Caption sidecar path for a media output path.
///
/// Shares the media file's base name with the split sequence placeholder
/// stripped, so one track covers all fragments of a split recording.
pub fn overlay_track_path(media_path: &Path) -> PathBuf {
    let stem = media_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = stem.strip_suffix("_%03d").unwrap_or(&stem);
    media_path.with_file_name(format!("{stem}.srt"))
}

/// Arguments for `gst-launch-1.0` capturing `spec` into `media_path`.
///
/// `-e` forces an EOS through the pipeline on interrupt so the muxer can
/// finalize the container before the process exits.
pub fn launch_args(spec: &StreamSpec, media_path: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec!["-e".into()];

    match &spec.source {
        StreamSource::Device { path } => {
            args.push("v4l2src".into());
            args.push(format!("device={path}"));
            args.push("!".into());
            args.push(spec.codec.caps(spec.width, spec.height, spec.framerate));
        }
        StreamSource::Network { url } => {
            args.push("rtspsrc".into());
            args.push(format!("location={url}"));
            args.push("!".into());
            args.push(spec.codec.depay_element().into());
        }
    }

    args.push("!".into());
    args.push(spec.codec.parse_element().into());
    args.push("!".into());

    let location = media_path.to_string_lossy();
    match spec.split_duration_secs {
        Some(secs) => {
            args.push("splitmuxsink".into());
            args.push(format!("location={location}"));
            // splitmuxsink takes nanoseconds
            args.push(format!("max-size-time={}", secs * 1_000_000_000));
            if spec.codec != StreamCodec::H264 {
                args.push(format!("muxer-factory={}", spec.codec.muxer()));
            }
        }
        None => {
            args.push(spec.codec.muxer().into());
            args.push("!".into());
            args.push("filesink".into());
            args.push(format!("location={location}"));
        }
    }

    args
}
