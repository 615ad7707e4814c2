//! Error types for the `frameledger` crate.
//!
//! This module defines [`FrameLedgerError`], the unified error type returned by
//! every fallible operation in the crate. Variants carry the paths, process
//! diagnostics, and upstream messages needed to explain a failure to an
//! operator without further logging at the call site.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use csv::Error as CsvError;
use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `frameledger` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameLedgerError {
    /// The source path does not resolve to an existing file.
    #[error("File not found: {}", path.display())]
    NotFound {
        /// Path that was requested.
        path: PathBuf,
    },

    /// The decoder could not open the video.
    #[error("Failed to open video at {}: {reason}", path.display())]
    OpenError {
        /// Path that was passed to [`crate::FrameReader::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The probed file does not contain a video stream.
    #[error("No video stream found in file")]
    NoStream,

    /// Probing succeeded but one of the required fields was missing or not
    /// strictly positive.
    #[error("Incomplete video metadata: {0}")]
    IncompleteMetadata(String),

    /// The inspection process exited with a non-zero status.
    #[error("{program} failed: {diagnostics}")]
    ProcessError {
        /// Program that was run.
        program: String,
        /// Captured diagnostic output.
        diagnostics: String,
    },

    /// The inspection process produced output that is not valid probe JSON.
    #[error("Malformed probe output: {0}")]
    MalformedProbeOutput(String),

    /// An external executable could not be launched.
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        /// Program that was launched.
        program: String,
        /// Underlying I/O failure.
        source: IoError,
    },

    /// The `ffmpeg` / `ffprobe` executables could not be located.
    #[error("FFmpeg tool not found: {0}")]
    ToolNotFound(String),

    /// The decoder exited with a non-zero status during range extraction.
    #[error("Frame extraction failed ({status}): {diagnostics}")]
    ExtractionFailed {
        /// Exit status as reported by the OS.
        status: String,
        /// Tail of the decoder's diagnostic stream.
        diagnostics: String,
    },

    /// The extraction watchdog expired and the decoder was terminated.
    #[error("Frame extraction timed out after {0:?}")]
    ExtractionTimedOut(Duration),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// A frame rate argument was zero, negative, or not finite.
    #[error("Invalid {name}: {value} (must be a positive, finite frame rate)")]
    InvalidRate {
        /// Which rate was rejected.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// A keyframe was submitted with an empty pixel buffer.
    #[error("Keyframe image is empty, nothing to write")]
    EmptyFrame,

    /// A keyframe could not be written, even through the in-memory fallback.
    #[error("Failed to write keyframe to {}: {reason}", path.display())]
    WriteFailed {
        /// Destination path.
        path: PathBuf,
        /// Reason reported by the last attempt.
        reason: String,
    },

    /// The requested image extension has no known encoder.
    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    /// A video frame could not be decoded or converted.
    #[error("Failed to decode video frame: {0}")]
    DecodeError(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// The ledger header does not match the expected column schema.
    #[error("Ledger schema mismatch: expected [{expected}], found [{found}]")]
    LedgerSchema {
        /// Expected header row.
        expected: String,
        /// Header row found on disk.
        found: String,
    },

    /// The ledger could not be read or written.
    #[error("Ledger error: {0}")]
    Ledger(#[from] CsvError),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while encoding a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl From<FfmpegError> for FrameLedgerError {
    fn from(error: FfmpegError) -> Self {
        FrameLedgerError::FfmpegError(error.to_string())
    }
}
