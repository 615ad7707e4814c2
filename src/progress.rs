//! Progress reporting and cancellation support.
//!
//! [`ProgressCallback`] observes long-running work, [`CancellationToken`]
//! requests that it stop, and [`ProgressInfo`] is the snapshot handed to the
//! callback. Range extraction ticks once per frame the decoder reports.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use frameledger::{ExtractOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}%", info.operation);
//!         }
//!     }
//! }
//!
//! let options = ExtractOptions::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use crate::extract::reconcile_timestamps;

/// The kind of operation currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Sampling a time range into frame files.
    RangeExtraction,
}

/// A snapshot of operation progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// Frames the decoder has reported so far.
    pub current: u64,
    /// Frames expected for the window, never below `current`.
    pub total: Option<u64>,
    /// Completion percentage, 0.0 to 100.0.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the operation started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Source-timeline presentation time of the latest reported frame.
    pub current_timestamp: Option<Duration>,
}

/// Trait for receiving progress updates.
///
/// Callbacks observe but cannot halt the operation; use
/// [`CancellationToken`] for that.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during an operation.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone it and call [`cancel`](CancellationToken::cancel) from any thread.
/// A cancelled range extraction terminates the decoder process and discards
/// its scratch output.
///
/// # Example
///
/// ```
/// use frameledger::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress of one range extraction, fed with every `pts_time` the decoder
/// reports.
///
/// `total` starts at the frame count the window should yield at the
/// sampling rate and is raised if the decoder produces more, so the
/// percentage never passes 100. Reported timestamps are placed on the source
/// timeline the same way committed frames are.
pub(crate) struct RangeProgress {
    callback: Option<Arc<dyn ProgressCallback>>,
    expected_frames: u64,
    start_seconds: f64,
    batch_size: u64,
    reported: u64,
    last_timestamp: Option<Duration>,
    started: Instant,
}

impl RangeProgress {
    pub(crate) fn new(
        callback: Option<Arc<dyn ProgressCallback>>,
        expected_frames: u64,
        start_seconds: f64,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            expected_frames,
            start_seconds,
            batch_size: batch_size.max(1),
            reported: 0,
            last_timestamp: None,
            started: Instant::now(),
        }
    }

    /// Frames the decoder has reported so far.
    pub(crate) fn reported(&self) -> u64 {
        self.reported
    }

    /// Record one decoded frame at `pts_seconds`.
    pub(crate) fn frame(&mut self, pts_seconds: f64) {
        self.reported += 1;
        let absolute = reconcile_timestamps(&[pts_seconds], self.start_seconds)
            .first()
            .copied()
            .unwrap_or(pts_seconds);
        self.last_timestamp = Duration::try_from_secs_f64(absolute).ok();

        if self.reported % self.batch_size == 0 {
            self.emit();
        }
    }

    /// Emit a final report once the decoder has exited cleanly.
    pub(crate) fn finish(&self) {
        self.emit();
    }

    pub(crate) fn snapshot(&self) -> ProgressInfo {
        let elapsed = self.started.elapsed();
        let total = self.expected_frames.max(self.reported);
        let percentage = (total > 0).then(|| self.reported as f32 / total as f32 * 100.0);
        let estimated_remaining = (self.reported > 0).then(|| {
            let remaining = total - self.reported;
            elapsed.mul_f64(remaining as f64 / self.reported as f64)
        });

        ProgressInfo {
            operation: OperationType::RangeExtraction,
            current: self.reported,
            total: Some(total),
            percentage,
            elapsed,
            estimated_remaining,
            current_timestamp: self.last_timestamp,
        }
    }

    fn emit(&self) {
        if let Some(callback) = &self.callback {
            callback.on_progress(&self.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressInfo>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push(info.clone());
        }
    }

    #[test]
    fn reports_every_batch_and_on_finish() {
        let recorder = Arc::new(Recorder::default());
        let mut progress = RangeProgress::new(Some(recorder.clone()), 5, 0.0, 2);
        for n in 0..5 {
            progress.frame(n as f64 * 0.2);
        }
        progress.finish();

        let counts: Vec<u64> = recorder.0.lock().unwrap().iter().map(|info| info.current).collect();
        assert_eq!(counts, vec![2, 4, 5]);
    }

    #[test]
    fn clip_relative_timestamps_land_on_the_source_timeline() {
        let mut progress = RangeProgress::new(None, 10, 2.0, 1);
        progress.frame(0.5);
        assert_eq!(progress.snapshot().current_timestamp, Some(Duration::from_millis(2_500)));

        progress.frame(2.75);
        assert_eq!(progress.snapshot().current_timestamp, Some(Duration::from_millis(2_750)));
    }

    #[test]
    fn total_grows_past_the_estimate() {
        let mut progress = RangeProgress::new(None, 2, 0.0, 1);
        for n in 0..3 {
            progress.frame(n as f64);
        }
        let info = progress.snapshot();
        assert_eq!(progress.reported(), 3);
        assert_eq!(info.total, Some(3));
        assert_eq!(info.percentage, Some(100.0));
        assert_eq!(info.estimated_remaining, Some(Duration::ZERO));
    }
}
