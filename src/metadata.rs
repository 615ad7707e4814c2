//! Video metadata types.
//!
//! [`VideoMetadata`] is the immutable snapshot returned by
//! [`VideoProbe::probe`](crate::VideoProbe::probe). It is produced once per
//! opened video and never mutated afterwards.

use std::{path::PathBuf, time::Duration};

/// Probed properties of a single video file.
///
/// Every numeric field except `total_frames` is guaranteed strictly positive
/// when produced by [`VideoProbe`](crate::VideoProbe); probing fails rather
/// than returning partial data.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoMetadata {
    /// Path that was probed, as passed by the caller.
    pub path: PathBuf,
    /// Container duration in seconds.
    pub duration_seconds: f64,
    /// Native frame rate of the first video stream.
    pub frames_per_second: f64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Reported frame count, or `round(duration * fps)` when the container
    /// does not report one.
    pub total_frames: u64,
}

impl VideoMetadata {
    /// Container duration as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds.max(0.0))
    }

    /// Duration in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        crate::utilities::seconds_to_ms(self.duration_seconds)
    }
}
