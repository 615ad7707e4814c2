//! Video probing through an external `ffprobe` process.
//!
//! [`VideoProbe`] asks `ffprobe` for the first video stream's dimensions,
//! frame rate, and frame count plus the container duration, in JSON mode, and
//! validates that the answer is complete before returning a
//! [`VideoMetadata`]. Nothing is cached: every call re-runs the process.
//!
//! # Example
//!
//! ```no_run
//! use frameledger::{FfmpegTools, VideoProbe};
//!
//! let tools = FfmpegTools::locate(None)?;
//! let metadata = VideoProbe::from_tools(&tools).probe("input.mp4")?;
//! println!(
//!     "{}x{} @ {:.2} fps, {} frames",
//!     metadata.width, metadata.height, metadata.frames_per_second, metadata.total_frames,
//! );
//! # Ok::<(), frameledger::FrameLedgerError>(())
//! ```

use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use serde::Deserialize;

use crate::{error::FrameLedgerError, ffmpeg::FfmpegTools, metadata::VideoMetadata};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<i64>,
    height: Option<i64>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Metadata query runner bound to one `ffprobe` executable.
#[derive(Debug, Clone)]
pub struct VideoProbe {
    ffprobe: PathBuf,
}

impl VideoProbe {
    /// Create a probe that runs the given `ffprobe` executable.
    pub fn new<P: Into<PathBuf>>(ffprobe: P) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }

    /// Create a probe using the `ffprobe` from a located tool set.
    pub fn from_tools(tools: &FfmpegTools) -> Self {
        Self::new(tools.ffprobe())
    }

    /// Probe a video file.
    ///
    /// # Errors
    ///
    /// - [`FrameLedgerError::NotFound`] if `video_path` does not exist.
    /// - [`FrameLedgerError::Spawn`] if `ffprobe` cannot be launched.
    /// - [`FrameLedgerError::ProcessError`] if `ffprobe` exits non-zero; the
    ///   message is its diagnostic output.
    /// - [`FrameLedgerError::NoStream`] if there is no video stream.
    /// - [`FrameLedgerError::IncompleteMetadata`] if width, height, frame
    ///   rate, or duration is not strictly positive.
    pub fn probe<P: AsRef<Path>>(&self, video_path: P) -> Result<VideoMetadata, FrameLedgerError> {
        let video_path = video_path.as_ref();
        if !video_path.exists() {
            return Err(FrameLedgerError::NotFound {
                path: video_path.to_path_buf(),
            });
        }

        log::debug!("Probing {} with {}", video_path.display(), self.ffprobe.display());

        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames",
                "-show_entries",
                "format=duration",
                "-of",
                "json",
            ])
            .arg(video_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| FrameLedgerError::Spawn {
                program: self.ffprobe.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let diagnostics = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(FrameLedgerError::ProcessError {
                program: "ffprobe".to_string(),
                diagnostics,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(video_path, &stdout)
    }

    /// Probe several files; failures are reported per entry rather than
    /// aborting the batch.
    pub fn probe_many<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Vec<Result<VideoMetadata, FrameLedgerError>> {
        paths.iter().map(|path| self.probe(path)).collect()
    }
}

/// Turn `ffprobe -of json` output into validated metadata.
fn parse_probe_output(video_path: &Path, json: &str) -> Result<VideoMetadata, FrameLedgerError> {
    let payload: ProbeOutput = serde_json::from_str(json)
        .map_err(|error| FrameLedgerError::MalformedProbeOutput(error.to_string()))?;

    let stream = payload.streams.first().ok_or(FrameLedgerError::NoStream)?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);

    // `avg_frame_rate` is "0/0" for some streams; fall back to the real base rate.
    let frames_per_second = [&stream.avg_frame_rate, &stream.r_frame_rate]
        .into_iter()
        .flatten()
        .map(|rate| parse_frame_rate(rate))
        .find(|&fps| fps > 0.0)
        .unwrap_or(0.0);

    let duration_seconds = payload
        .format
        .as_ref()
        .and_then(|format| format.duration.as_deref())
        .and_then(|duration| duration.trim().parse::<f64>().ok())
        .filter(|duration| duration.is_finite())
        .unwrap_or(0.0);

    let total_frames = parse_total_frames(
        stream.nb_frames.as_deref(),
        duration_seconds,
        frames_per_second,
    );

    let mut missing = Vec::new();
    if width <= 0 {
        missing.push(format!("width={width}"));
    }
    if height <= 0 {
        missing.push(format!("height={height}"));
    }
    if frames_per_second <= 0.0 {
        missing.push(format!("fps={frames_per_second}"));
    }
    if duration_seconds <= 0.0 {
        missing.push(format!("duration={duration_seconds}"));
    }
    if !missing.is_empty() {
        return Err(FrameLedgerError::IncompleteMetadata(missing.join(", ")));
    }

    Ok(VideoMetadata {
        path: video_path.to_path_buf(),
        duration_seconds,
        frames_per_second,
        width: u32::try_from(width).unwrap_or(u32::MAX),
        height: u32::try_from(height).unwrap_or(u32::MAX),
        total_frames,
    })
}

/// Parse an FFmpeg rational such as `"30000/1001"` or a plain number.
///
/// A zero denominator or unparseable input yields `0.0`.
pub(crate) fn parse_frame_rate(value: &str) -> f64 {
    let value = value.trim();
    let rate = match value.split_once('/') {
        Some((numerator, denominator)) => {
            let numerator = numerator.trim().parse::<f64>().unwrap_or(0.0);
            let denominator = denominator.trim().parse::<f64>().unwrap_or(0.0);
            if denominator == 0.0 {
                return 0.0;
            }
            numerator / denominator
        }
        None => value.parse::<f64>().unwrap_or(0.0),
    };
    if rate.is_finite() { rate } else { 0.0 }
}

/// Prefer an explicit integer frame count, else estimate from duration × fps.
pub(crate) fn parse_total_frames(
    nb_frames: Option<&str>,
    duration_seconds: f64,
    frames_per_second: f64,
) -> u64 {
    if let Some(count) = nb_frames
        .map(str::trim)
        .filter(|count| !count.is_empty() && count.bytes().all(|byte| byte.is_ascii_digit()))
        .and_then(|count| count.parse::<u64>().ok())
    {
        return count;
    }
    if duration_seconds > 0.0 && frames_per_second > 0.0 {
        return (duration_seconds * frames_per_second).round() as u64;
    }
    0
}
