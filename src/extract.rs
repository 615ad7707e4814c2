//! Batch range extraction through the `ffmpeg` executable.
//!
//! [`RangeExtractor`] samples a time window of a video at a chosen rate into
//! numbered scratch images, recovers each frame's presentation time from the
//! decoder's `showinfo` diagnostics as they stream in, and commits only the
//! frames whose deterministic destination does not exist yet. Re-running an
//! extraction over the same window therefore produces no duplicates.
//!
//! # Example
//!
//! ```no_run
//! use frameledger::{FfmpegTools, ProjectLayout, RangeExtractor, VideoContext};
//!
//! let tools = FfmpegTools::locate(None)?;
//! let layout = ProjectLayout::init("project")?;
//! let video = VideoContext::for_video(&layout, "clip.mp4")?;
//!
//! let extraction = RangeExtractor::from_tools(&tools).extract_range(
//!     &layout, &video, "clip.mp4".as_ref(), 2_000, 4_000, 5.0, 30.0, "jpg",
//! )?;
//! layout.ledger()?.append(&extraction.records)?;
//! println!("{} new, {} already present", extraction.records.len(), extraction.skipped);
//! # Ok::<(), frameledger::FrameLedgerError>(())
//! ```

use std::{
    collections::VecDeque,
    fs,
    io::{BufRead, BufReader, Error as IoError},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::LazyLock,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::RecvTimeoutError;
use regex::Regex;

use crate::{
    config::ExtractOptions,
    error::FrameLedgerError,
    ffmpeg::FfmpegTools,
    ledger::{FrameKind, FrameRecord},
    progress::RangeProgress,
    project::{ProjectLayout, VideoContext, frame_filename, normalize_extension},
    utilities::{ms_to_frame_index, seconds_to_ms},
};

/// Scratch directory name under a video's `ranges/` folder.
const SCRATCH_DIR: &str = ".tmp_extract";
/// Diagnostic lines kept for error reports.
const DIAGNOSTIC_TAIL_LINES: usize = 32;
/// How often the watchdog checks cancellation and the timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

static PTS_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"pts_time:\s*(?P<pts>-?[0-9.]+)").expect("valid regex")
});

/// A time window in milliseconds with `in_ms <= out_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Window start.
    pub in_ms: u64,
    /// Window end.
    pub out_ms: u64,
}

impl TimeRange {
    /// Build a range, swapping the endpoints if given out of order.
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            in_ms: a.min(b),
            out_ms: a.max(b),
        }
    }

    /// `true` when the window has zero length.
    pub fn is_empty(&self) -> bool {
        self.in_ms == self.out_ms
    }

    /// Window length in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.out_ms - self.in_ms
    }
}

/// Result of one [`RangeExtractor::extract_range`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeExtraction {
    /// Newly committed frames, in decoder order.
    pub records: Vec<FrameRecord>,
    /// Frames whose destination already existed.
    pub skipped: usize,
}

/// Incremental parser for `pts_time:` tokens in decoder diagnostics.
///
/// Feed it one line at a time; it keeps the ordered timestamps and a bounded
/// tail of the raw lines for error reports.
#[derive(Debug, Clone, Default)]
pub struct PtsScanner {
    timestamps: Vec<f64>,
    tail: VecDeque<String>,
}

impl PtsScanner {
    /// Create an empty scanner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one diagnostic line, returning its timestamp if it has one.
    pub fn push_line(&mut self, line: &str) -> Option<f64> {
        if self.tail.len() == DIAGNOSTIC_TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_string());

        let seconds = parse_pts_time(line)?;
        self.timestamps.push(seconds);
        Some(seconds)
    }

    /// Scan a whole reader line by line.
    pub fn scan<R: BufRead>(&mut self, mut reader: R) -> Result<(), FrameLedgerError> {
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            if reader.read_until(b'\n', &mut buffer)? == 0 {
                return Ok(());
            }
            self.push_line(String::from_utf8_lossy(&buffer).trim_end());
        }
    }

    /// Timestamps seen so far, in seconds.
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Consume the scanner, returning its timestamps.
    pub fn into_timestamps(self) -> Vec<f64> {
        self.timestamps
    }

    /// The most recent diagnostic lines, newline-joined.
    pub fn diagnostics(&self) -> String {
        if self.tail.is_empty() {
            return "no diagnostic output".to_string();
        }
        self.tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Extract the presentation time in seconds from one diagnostic line.
pub fn parse_pts_time(line: &str) -> Option<f64> {
    PTS_TIME
        .captures(line)
        .and_then(|captures| captures["pts"].parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite())
}

/// Shift clip-relative timestamps onto the source timeline.
///
/// When `start_seconds > 0` and the earliest timestamp is below half of it,
/// the values are taken as relative to the trimmed clip and `start_seconds`
/// is added to each. Otherwise they are returned unchanged. This is a
/// heuristic: a window starting very close to zero cannot be told apart.
pub fn reconcile_timestamps(raw: &[f64], start_seconds: f64) -> Vec<f64> {
    let earliest = raw.iter().copied().reduce(f64::min);
    match earliest {
        Some(earliest) if start_seconds > 0.0 && earliest < start_seconds * 0.5 => {
            raw.iter().map(|seconds| seconds + start_seconds).collect()
        }
        _ => raw.to_vec(),
    }
}

/// Runs range extractions with one `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct RangeExtractor {
    ffmpeg: PathBuf,
    options: ExtractOptions,
}

impl RangeExtractor {
    /// Use the `ffmpeg` executable at `ffmpeg`.
    pub fn new<P: Into<PathBuf>>(ffmpeg: P) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            options: ExtractOptions::default(),
        }
    }

    /// Use the `ffmpeg` found by [`FfmpegTools::locate`].
    pub fn from_tools(tools: &FfmpegTools) -> Self {
        Self::new(tools.ffmpeg())
    }

    /// Replace the extraction options.
    #[must_use]
    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Sample `[start_ms, end_ms]` of `video_path` at `sampling_fps` into
    /// `frames/<video_folder>/ranges/`.
    ///
    /// `frame_index` of every record is recomputed from its timestamp at
    /// `source_fps`, so it shares an index space with keyframes taken from
    /// the same video. An empty or inverted window returns an empty result
    /// without touching the filesystem.
    ///
    /// # Errors
    ///
    /// - [`FrameLedgerError::InvalidRate`] if either rate is not positive.
    /// - [`FrameLedgerError::NotFound`] if `video_path` does not exist.
    /// - [`FrameLedgerError::Spawn`] if `ffmpeg` cannot be launched.
    /// - [`FrameLedgerError::ExtractionFailed`] if `ffmpeg` exits non-zero.
    /// - [`FrameLedgerError::Cancelled`] or
    ///   [`FrameLedgerError::ExtractionTimedOut`] if the options stop it.
    /// - [`FrameLedgerError::WriteFailed`] if a frame cannot be moved into
    ///   place. Frames moved earlier in the same call are removed again.
    ///
    /// The scratch directory is removed on every error path.
    #[allow(clippy::too_many_arguments)]
    pub fn extract_range(
        &self,
        layout: &ProjectLayout,
        video: &VideoContext,
        video_path: &Path,
        start_ms: u64,
        end_ms: u64,
        sampling_fps: f64,
        source_fps: f64,
        ext: &str,
    ) -> Result<RangeExtraction, FrameLedgerError> {
        if end_ms <= start_ms {
            log::debug!("Empty range {start_ms}..{end_ms} ms, nothing to extract");
            return Ok(RangeExtraction::default());
        }
        validate_rate("sampling fps", sampling_fps)?;
        validate_rate("source fps", source_fps)?;
        if !video_path.is_file() {
            return Err(FrameLedgerError::NotFound {
                path: video_path.to_path_buf(),
            });
        }

        let ext = normalize_extension(ext);
        let ranges_dir = layout.kind_dir(&video.video_folder, FrameKind::Range);
        let scratch_dir = ranges_dir.join(SCRATCH_DIR);
        if scratch_dir.exists() {
            log::debug!("Removing stale scratch output in {}", scratch_dir.display());
            fs::remove_dir_all(&scratch_dir)?;
        }
        fs::create_dir_all(&scratch_dir)?;

        let start_seconds = start_ms as f64 / 1000.0;
        let expected_frames =
            ((end_ms - start_ms) as f64 / 1000.0 * sampling_fps).ceil() as u64;
        let command = self.decoder_command(video_path, start_ms, end_ms, sampling_fps, &ext, &scratch_dir);

        let progress = RangeProgress::new(
            self.options.progress.clone(),
            expected_frames,
            start_seconds,
            self.options.batch_size,
        );

        let raw = match self.run_decoder(command, progress) {
            Ok(raw) => raw,
            Err(error) => {
                discard_scratch(&scratch_dir);
                return Err(error);
            }
        };
        let timestamps = reconcile_timestamps(&raw, start_seconds);

        let result = commit_scratch(
            layout,
            video,
            &scratch_dir,
            &timestamps,
            start_seconds,
            sampling_fps,
            source_fps,
            &ext,
        );
        discard_scratch(&scratch_dir);
        let extraction = result?;

        log::info!(
            "Extracted {} frame(s) from {} ({start_ms}..{end_ms} ms @ {sampling_fps} fps), {} already present",
            extraction.records.len(),
            video_path.display(),
            extraction.skipped
        );
        Ok(extraction)
    }

    fn decoder_command(
        &self,
        video_path: &Path,
        start_ms: u64,
        end_ms: u64,
        sampling_fps: f64,
        ext: &str,
        scratch_dir: &Path,
    ) -> Command {
        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-hide_banner", "-nostats", "-loglevel", "info"])
            .arg("-ss")
            .arg(format!("{:.3}", start_ms as f64 / 1000.0))
            .arg("-to")
            .arg(format!("{:.3}", end_ms as f64 / 1000.0))
            .arg("-i")
            .arg(video_path)
            .arg("-vf")
            .arg(format!("fps={sampling_fps},showinfo"));
        if matches!(ext, "jpg" | "jpeg") {
            command
                .arg("-q:v")
                .arg(self.options.jpeg_quality.to_string());
        }
        command.arg(scratch_dir.join(format!("frame_%07d.{ext}")));
        command
    }

    /// Run the decoder to completion, streaming its stderr through a
    /// [`PtsScanner`]. Returns the raw timestamps in emission order.
    fn run_decoder(
        &self,
        mut command: Command,
        mut progress: RangeProgress,
    ) -> Result<Vec<f64>, FrameLedgerError> {
        log::debug!("Running {command:?}");

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| FrameLedgerError::Spawn {
                program: self.ffmpeg.display().to_string(),
                source,
            })?;

        let Some(stderr) = child.stderr.take() else {
            terminate(&mut child);
            return Err(IoError::other("decoder stderr was not captured").into());
        };

        let (sender, receiver) = crossbeam_channel::unbounded::<String>();
        let reader_thread = thread::spawn(move || {
            let mut reader = BufReader::new(stderr);
            let mut buffer = Vec::new();
            loop {
                buffer.clear();
                match reader.read_until(b'\n', &mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buffer).trim_end().to_string();
                        if sender.send(line).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut scanner = PtsScanner::new();
        let started = Instant::now();

        let interrupted = loop {
            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    if let Some(seconds) = scanner.push_line(&line) {
                        progress.frame(seconds);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break None,
            }
            if self.options.is_cancelled() {
                break Some(FrameLedgerError::Cancelled);
            }
            if let Some(limit) = self.options.timeout {
                if started.elapsed() >= limit {
                    break Some(FrameLedgerError::ExtractionTimedOut(limit));
                }
            }
        };

        if let Some(error) = interrupted {
            log::warn!("Stopping decoder: {error}");
            terminate(&mut child);
            if reader_thread.join().is_err() {
                log::warn!("Decoder stderr reader panicked");
            }
            return Err(error);
        }

        let status = child.wait()?;
        if reader_thread.join().is_err() {
            log::warn!("Decoder stderr reader panicked");
        }

        if !status.success() {
            return Err(FrameLedgerError::ExtractionFailed {
                status: status.to_string(),
                diagnostics: scanner.diagnostics(),
            });
        }

        progress.finish();
        log::debug!(
            "Decoder reported {} frame(s) in {:?}",
            progress.reported(),
            started.elapsed()
        );
        Ok(scanner.into_timestamps())
    }
}

/// A scratch image and where it lands once committed.
#[derive(Debug)]
struct PendingFrame {
    scratch_file: PathBuf,
    destination: PathBuf,
    record: FrameRecord,
}

#[allow(clippy::too_many_arguments)]
fn commit_scratch(
    layout: &ProjectLayout,
    video: &VideoContext,
    scratch_dir: &Path,
    timestamps: &[f64],
    start_seconds: f64,
    sampling_fps: f64,
    source_fps: f64,
    ext: &str,
) -> Result<RangeExtraction, FrameLedgerError> {
    let mut produced = Vec::new();
    for entry in fs::read_dir(scratch_dir)? {
        let path = entry?.path();
        let matches_ext = path
            .extension()
            .is_some_and(|found| found.eq_ignore_ascii_case(ext));
        if path.is_file() && matches_ext {
            produced.push(path);
        }
    }
    // Zero-padded sequence numbers sort numerically as strings.
    produced.sort();

    let pending = produced
        .into_iter()
        .enumerate()
        .map(|(position, scratch_file)| {
            let seconds = timestamps
                .get(position)
                .copied()
                .unwrap_or_else(|| start_seconds + position as f64 / sampling_fps);
            let timestamp_ms = seconds_to_ms(seconds);
            let frame_index = ms_to_frame_index(timestamp_ms, source_fps);

            let filename = frame_filename(timestamp_ms, frame_index, ext);
            let image_relpath =
                layout.image_relpath(&video.video_folder, FrameKind::Range, &filename);
            PendingFrame {
                scratch_file,
                destination: layout.resolve(&image_relpath),
                record: FrameRecord {
                    video_id: video.video_id.clone(),
                    src_video_path: video.src_video_path.clone(),
                    timestamp_ms,
                    frame_index,
                    kind: FrameKind::Range,
                    image_relpath,
                },
            }
        })
        .collect();
    commit_frames(pending)
}

/// Move every pending frame into place, all or nothing.
///
/// Existing destinations are skipped. If a move fails, the frames already
/// moved by this call are removed again before the error is returned, so
/// `ranges/` never holds a committed frame without a returned record.
fn commit_frames(pending: Vec<PendingFrame>) -> Result<RangeExtraction, FrameLedgerError> {
    let mut extraction = RangeExtraction::default();
    let mut committed: Vec<PathBuf> = Vec::new();

    for frame in pending {
        if frame.destination.exists() {
            extraction.skipped += 1;
            if let Err(error) = fs::remove_file(&frame.scratch_file) {
                log::warn!("Failed to remove {}: {error}", frame.scratch_file.display());
            }
            continue;
        }

        if let Err(error) = fs::rename(&frame.scratch_file, &frame.destination) {
            for path in committed.iter().rev() {
                if let Err(error) = fs::remove_file(path) {
                    log::warn!("Failed to roll back {}: {error}", path.display());
                }
            }
            return Err(FrameLedgerError::WriteFailed {
                path: frame.destination,
                reason: error.to_string(),
            });
        }
        committed.push(frame.destination);
        extraction.records.push(frame.record);
    }
    Ok(extraction)
}

fn validate_rate(name: &'static str, value: f64) -> Result<(), FrameLedgerError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(FrameLedgerError::InvalidRate { name, value })
    }
}

fn terminate(child: &mut Child) {
    if let Err(error) = child.kill() {
        log::warn!("Failed to kill decoder: {error}");
    }
    if let Err(error) = child.wait() {
        log::warn!("Failed to reap decoder: {error}");
    }
}

fn discard_scratch(scratch_dir: &Path) {
    if let Err(error) = fs::remove_dir_all(scratch_dir) {
        if scratch_dir.exists() {
            log::warn!(
                "Failed to remove scratch directory {}: {error}",
                scratch_dir.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOWINFO: &str = "[Parsed_showinfo_1 @ 0x55d0] n:   3 pts:  46080 pts_time:3.0     duration:  512 fmt:yuv420p";

    #[test]
    fn parses_showinfo_lines() {
        assert_eq!(parse_pts_time(SHOWINFO), Some(3.0));
        assert_eq!(parse_pts_time("pts_time:0.2"), Some(0.2));
        assert_eq!(parse_pts_time("frame=   10 fps=0.0 q=2.0"), None);
        assert_eq!(parse_pts_time("pts_time:."), None);
    }

    #[test]
    fn scanner_keeps_order_and_bounded_tail() {
        let mut scanner = PtsScanner::new();
        let mut text = String::new();
        for n in 0..40 {
            text.push_str(&format!("n:{n} pts_time:{}\n", n as f64 * 0.2));
        }
        text.push_str("Stream mapping: done\n");
        scanner.scan(text.as_bytes()).unwrap();

        assert_eq!(scanner.timestamps().len(), 40);
        assert_eq!(scanner.timestamps()[5], 1.0);
        let diagnostics = scanner.diagnostics();
        assert_eq!(diagnostics.lines().count(), DIAGNOSTIC_TAIL_LINES);
        assert!(diagnostics.ends_with("Stream mapping: done"));
    }

    #[test]
    fn clip_relative_timestamps_are_shifted() {
        let shifted = reconcile_timestamps(&[0.0, 0.2, 0.4], 2.0);
        assert_eq!(shifted, vec![2.0, 2.2, 2.4]);
    }

    #[test]
    fn absolute_timestamps_are_kept() {
        let raw = [2.0, 2.2, 2.4];
        assert_eq!(reconcile_timestamps(&raw, 2.0), raw.to_vec());
        assert_eq!(reconcile_timestamps(&[0.0, 0.5], 0.0), vec![0.0, 0.5]);
        assert!(reconcile_timestamps(&[], 3.0).is_empty());
    }

    #[test]
    fn time_range_swaps_endpoints() {
        let range = TimeRange::new(4_000, 2_000);
        assert_eq!(range, TimeRange { in_ms: 2_000, out_ms: 4_000 });
        assert_eq!(range.duration_ms(), 2_000);
        assert!(TimeRange::new(7, 7).is_empty());
    }

    #[test]
    fn rates_must_be_positive_and_finite() {
        assert!(validate_rate("sampling fps", 5.0).is_ok());
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                validate_rate("sampling fps", bad),
                Err(FrameLedgerError::InvalidRate { .. })
            ));
        }
    }

    fn pending(directory: &Path, name: &str, destination: PathBuf) -> PendingFrame {
        let scratch_file = directory.join(format!("{name}.jpg"));
        fs::write(&scratch_file, name).unwrap();
        PendingFrame {
            scratch_file,
            destination,
            record: FrameRecord {
                video_id: "clip__00000000".to_string(),
                src_video_path: "clip.mp4".to_string(),
                timestamp_ms: 0,
                frame_index: 0,
                kind: FrameKind::Range,
                image_relpath: name.to_string(),
            },
        }
    }

    #[test]
    fn failed_move_rolls_back_committed_frames() {
        let directory = tempfile::tempdir().unwrap();
        let scratch = directory.path().join("scratch");
        let ranges = directory.path().join("ranges");
        fs::create_dir_all(&scratch).unwrap();
        fs::create_dir_all(&ranges).unwrap();
        fs::write(ranges.join("existing.jpg"), "kept").unwrap();

        let frames = vec![
            pending(&scratch, "a", ranges.join("a.jpg")),
            pending(&scratch, "existing", ranges.join("existing.jpg")),
            pending(&scratch, "b", ranges.join("b.jpg")),
            // Missing parent directory makes the move fail.
            pending(&scratch, "c", ranges.join("missing").join("c.jpg")),
            pending(&scratch, "d", ranges.join("d.jpg")),
        ];

        let result = commit_frames(frames);
        assert!(
            matches!(&result, Err(FrameLedgerError::WriteFailed { path, .. }) if path.ends_with("c.jpg")),
            "expected WriteFailed, got {result:?}"
        );
        assert!(!ranges.join("a.jpg").exists());
        assert!(!ranges.join("b.jpg").exists());
        assert!(!ranges.join("d.jpg").exists());
        assert_eq!(fs::read_to_string(ranges.join("existing.jpg")).unwrap(), "kept");
    }

    #[test]
    fn commit_skips_existing_destinations() {
        let directory = tempfile::tempdir().unwrap();
        let ranges = directory.path();
        fs::write(ranges.join("b.jpg"), "kept").unwrap();

        let frames = vec![
            pending(ranges, "scratch_a", ranges.join("a.jpg")),
            pending(ranges, "scratch_b", ranges.join("b.jpg")),
        ];
        let extraction = commit_frames(frames).unwrap();

        assert_eq!(extraction.skipped, 1);
        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].image_relpath, "scratch_a");
        assert_eq!(fs::read_to_string(ranges.join("a.jpg")).unwrap(), "scratch_a");
        assert!(!ranges.join("scratch_b.jpg").exists());
    }
}
