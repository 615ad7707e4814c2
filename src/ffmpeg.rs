//! FFmpeg integration points.
//!
//! This crate talks to FFmpeg in two ways: in-process through `ffmpeg-next`
//! for random-access reading ([`FrameReader`](crate::FrameReader)), and as
//! external `ffmpeg` / `ffprobe` executables for probing and range
//! extraction. [`FfmpegTools`] locates the executables; the log-level
//! functions tune the in-process library's console output.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use frameledger::{FfmpegLogLevel, FfmpegTools};
//!
//! frameledger::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//!
//! let tools = FfmpegTools::locate(Some(Path::new("/opt/ffmpeg/bin")))?;
//! println!("ffmpeg: {}", tools.ffmpeg().display());
//! # Ok::<(), frameledger::FrameLedgerError>(())
//! ```
//!
//! # Note
//!
//! The log level controls **FFmpeg's own console output** from the linked
//! library, not the Rust-side `log` records or the child processes' stderr.

use std::{
    env,
    path::{Path, PathBuf},
};

use ffmpeg_next::util::log::Level;

use crate::error::FrameLedgerError;

/// FFmpeg internal log verbosity level.
///
/// Maps directly to FFmpeg's `AV_LOG_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only conditions that abort the process.
    Panic,
    /// Unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }

    /// Parse a level name as accepted on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "quiet" => Some(FfmpegLogLevel::Quiet),
            "panic" => Some(FfmpegLogLevel::Panic),
            "fatal" => Some(FfmpegLogLevel::Fatal),
            "error" => Some(FfmpegLogLevel::Error),
            "warning" | "warn" => Some(FfmpegLogLevel::Warning),
            "info" => Some(FfmpegLogLevel::Info),
            "verbose" => Some(FfmpegLogLevel::Verbose),
            "debug" => Some(FfmpegLogLevel::Debug),
            "trace" => Some(FfmpegLogLevel::Trace),
            _ => None,
        }
    }
}

/// Set the in-process FFmpeg log verbosity.
///
/// This does **not** affect Rust-side `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Resolved paths of the external `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegTools {
    /// Use explicit executable paths without any lookup.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(ffmpeg: P, ffprobe: Q) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Locate `ffmpeg` and `ffprobe`.
    ///
    /// A `custom_dir` is used only when **both** executables exist in it
    /// (with or without an `.exe` suffix); otherwise each tool is searched
    /// for on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameLedgerError::ToolNotFound`] naming whichever tool could
    /// not be found.
    pub fn locate(custom_dir: Option<&Path>) -> Result<Self, FrameLedgerError> {
        if let Some(dir) = custom_dir {
            let ffmpeg = executable_in(dir, "ffmpeg");
            let ffprobe = executable_in(dir, "ffprobe");
            if let (Some(ffmpeg), Some(ffprobe)) = (ffmpeg, ffprobe) {
                log::debug!("Using FFmpeg tools from {}", dir.display());
                return Ok(Self { ffmpeg, ffprobe });
            }
            log::warn!(
                "ffmpeg/ffprobe not both present in {}, falling back to PATH",
                dir.display()
            );
        }

        let ffmpeg = find_on_path("ffmpeg")
            .ok_or_else(|| FrameLedgerError::ToolNotFound("ffmpeg".to_string()))?;
        let ffprobe = find_on_path("ffprobe")
            .ok_or_else(|| FrameLedgerError::ToolNotFound("ffprobe".to_string()))?;
        Ok(Self { ffmpeg, ffprobe })
    }

    /// Path of the `ffmpeg` executable.
    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    /// Path of the `ffprobe` executable.
    pub fn ffprobe(&self) -> &Path {
        &self.ffprobe
    }
}

fn executable_in(dir: &Path, name: &str) -> Option<PathBuf> {
    [format!("{name}.exe"), name.to_string()]
        .into_iter()
        .map(|file_name| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var).find_map(|dir| executable_in(&dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(FfmpegLogLevel::from_name("WARN"), Some(FfmpegLogLevel::Warning));
        assert_eq!(FfmpegLogLevel::from_name("quiet"), Some(FfmpegLogLevel::Quiet));
        assert_eq!(FfmpegLogLevel::from_name("loud"), None);
    }

    #[test]
    fn custom_dir_requires_both_tools() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ffmpeg"), b"").unwrap();
        assert!(executable_in(dir.path(), "ffmpeg").is_some());
        assert!(executable_in(dir.path(), "ffprobe").is_none());

        std::fs::write(dir.path().join("ffprobe.exe"), b"").unwrap();
        let tools = FfmpegTools::locate(Some(dir.path())).unwrap();
        assert_eq!(tools.ffmpeg(), dir.path().join("ffmpeg"));
        assert_eq!(tools.ffprobe(), dir.path().join("ffprobe.exe"));
    }
}
