//! # frameledger
//!
//! Extract still frames from video files into a project directory and keep
//! an append-only ledger of every frame written.
//!
//! `frameledger` identifies each source video by a content-sensitive folder
//! name, probes its stream metadata with `ffprobe`, reads individual frames
//! frame-accurately through [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next),
//! samples whole time ranges through the `ffmpeg` executable, and records
//! each committed image as one CSV row. Every frame maps to a deterministic
//! filename, so repeated extractions never duplicate files or ledger rows.
//!
//! ## Quick Start
//!
//! ### Capture a Single Frame
//!
//! ```no_run
//! use frameledger::{FrameReader, ProjectLayout, VideoContext, save_frame};
//!
//! let layout = ProjectLayout::init("project")?;
//! let video = VideoContext::for_video(&layout, "clip.mp4")?;
//!
//! let mut reader = FrameReader::from_path("clip.mp4")?;
//! if let Some(frame) = reader.seek_to_timestamp(12_500)? {
//!     if let Some(record) = save_frame(&layout, &video, &frame, "png")? {
//!         layout.ledger()?.append(&[record])?;
//!     }
//! }
//! # Ok::<(), frameledger::FrameLedgerError>(())
//! ```
//!
//! ### Extract a Time Range
//!
//! ```no_run
//! use frameledger::{FfmpegTools, ProjectLayout, RangeExtractor, VideoContext, VideoProbe};
//!
//! let tools = FfmpegTools::locate(None)?;
//! let layout = ProjectLayout::init("project")?;
//! let video = VideoContext::for_video(&layout, "clip.mp4")?;
//! let metadata = VideoProbe::from_tools(&tools).probe("clip.mp4")?;
//!
//! let extraction = RangeExtractor::from_tools(&tools).extract_range(
//!     &layout,
//!     &video,
//!     &metadata.path,
//!     2_000,
//!     4_000,
//!     5.0,
//!     metadata.frames_per_second,
//!     "jpg",
//! )?;
//! layout.ledger()?.append(&extraction.records)?;
//! # Ok::<(), frameledger::FrameLedgerError>(())
//! ```
//!
//! ## Features
//!
//! - **Video identity**: `{stem}__{hash}` folder names that change when the
//!   file is replaced, resized, or touched
//! - **Probing**: dimensions, frame rate, duration, and frame count from
//!   `ffprobe` JSON
//! - **Random access**: seek by frame index or timestamp; indices and
//!   timestamps stay consistent across seeks
//! - **Range extraction**: streamed `showinfo` timestamp recovery,
//!   clip-relative timestamp reconciliation, skip-if-exists commits
//! - **Progress & cancellation**: callbacks, `CancellationToken`, and a
//!   watchdog timeout for the decoder process
//! - **Ledger**: header-checked CSV, append-only, file order preserved
//! - **Source registry**: one `sources.csv` row per video identity
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed to build, and the
//! `ffmpeg`/`ffprobe` executables must be reachable on `PATH` or in a
//! directory passed to [`FfmpegTools::locate`].

pub mod config;
pub mod error;
pub mod extract;
pub mod ffmpeg;
pub mod identity;
pub mod keyframe;
pub mod ledger;
pub mod metadata;
pub mod probe;
pub mod progress;
pub mod project;
pub mod reader;
pub mod sources;
mod utilities;

pub use config::ExtractOptions;
pub use error::FrameLedgerError;
pub use extract::{
    PtsScanner, RangeExtraction, RangeExtractor, TimeRange, parse_pts_time, reconcile_timestamps,
};
pub use ffmpeg::{FfmpegLogLevel, FfmpegTools, set_ffmpeg_log_level};
pub use identity::{DEFAULT_HASH_LENGTH, short_hash_for_path, video_folder_name};
pub use keyframe::{save_frame, save_keyframe};
pub use ledger::{FrameKind, FrameLedger, FrameRecord, LEDGER_COLUMNS};
pub use metadata::VideoMetadata;
pub use probe::VideoProbe;
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use project::{ProjectLayout, VideoContext, frame_filename, normalize_source_path};
pub use reader::{Frame, FrameReader};
pub use sources::{SOURCE_COLUMNS, SourceRecord, SourceRegistry};
