//! Internal utility functions.
//!
//! Frame-index and timestamp conversions shared by the reader and the range
//! extractor, plus pixel-data copying for decoded frames. The frame index is
//! always the source of truth: timestamps are derived from it, never the
//! other way around.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Convert a frame index to a millisecond timestamp at the given frame rate.
///
/// `round(frame_index / fps * 1000)`. A non-positive rate yields `0`.
pub(crate) fn frame_index_to_ms(frame_index: u64, frames_per_second: f64) -> u64 {
    if frames_per_second <= 0.0 || !frames_per_second.is_finite() {
        return 0;
    }
    (frame_index as f64 / frames_per_second * 1000.0).round() as u64
}

/// Convert a millisecond timestamp to the nearest frame index.
///
/// `round(timestamp_ms / 1000 * fps)`.
pub(crate) fn ms_to_frame_index(timestamp_ms: u64, frames_per_second: f64) -> u64 {
    if frames_per_second <= 0.0 || !frames_per_second.is_finite() {
        return 0;
    }
    (timestamp_ms as f64 / 1000.0 * frames_per_second).round() as u64
}

/// Round a timestamp in seconds to whole milliseconds, clamping negatives to 0.
pub(crate) fn seconds_to_ms(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * 1000.0).round() as u64
}

/// Convert a frame index to an `AV_TIME_BASE` (microsecond) seek target.
///
/// Container-level seeks (no stream index) are expressed in
/// `AV_TIME_BASE` units regardless of the stream's own time base.
pub(crate) fn frame_index_to_seek_target(frame_index: u64, frames_per_second: f64) -> i64 {
    if frames_per_second <= 0.0 {
        return 0;
    }
    let seconds = frame_index as f64 / frames_per_second;
    (seconds * ffmpeg_next::ffi::AV_TIME_BASE as f64) as i64
}

/// Rescale a PTS value from stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    if time_base.denominator() == 0 {
        return 0.0;
    }
    pts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator())
}

/// Rescale a PTS value to the nearest frame index.
pub(crate) fn pts_to_frame_index(pts: i64, time_base: Rational, frames_per_second: f64) -> u64 {
    let seconds = pts_to_seconds(pts, time_base);
    if seconds <= 0.0 {
        return 0;
    }
    (seconds * frames_per_second).round() as u64
}

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × bpp).
/// The result can be passed directly to [`image::RgbImage::from_raw`].
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = width as usize * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_bytes {
        return data[..row_bytes * height as usize].to_vec();
    }

    let mut buffer = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let row_start = row * stride;
        buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_round_trips_through_ms_at_common_rates() {
        for fps in [23.976, 24.0, 25.0, 29.97, 30.0, 60.0] {
            for index in [0_u64, 1, 59, 60, 61, 1799, 123_456] {
                let ms = frame_index_to_ms(index, fps);
                assert_eq!(ms_to_frame_index(ms, fps), index, "fps={fps} index={index}");
            }
        }
    }

    #[test]
    fn zero_rate_maps_to_zero() {
        assert_eq!(frame_index_to_ms(42, 0.0), 0);
        assert_eq!(ms_to_frame_index(4200, 0.0), 0);
        assert_eq!(frame_index_to_seek_target(42, 0.0), 0);
    }

    #[test]
    fn seconds_to_ms_rounds_and_clamps() {
        assert_eq!(seconds_to_ms(2.0004), 2000);
        assert_eq!(seconds_to_ms(2.0006), 2001);
        assert_eq!(seconds_to_ms(-0.5), 0);
        assert_eq!(seconds_to_ms(f64::NAN), 0);
    }

    #[test]
    fn pts_rescales_to_frame_index() {
        let time_base = Rational::new(1, 15360);
        // 2 seconds at 30 fps.
        assert_eq!(pts_to_frame_index(30720, time_base, 30.0), 60);
        assert_eq!(pts_to_frame_index(-512, time_base, 30.0), 0);
    }
}
