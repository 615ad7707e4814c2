//! Frame-accurate random-access reading.
//!
//! [`FrameReader`] owns one decode session over one open video. It supports
//! sequential reads and seeking by frame index or timestamp, and it labels
//! every frame with an index taken from its own cursor, not from the
//! decoder. Timestamps are always derived from that index and the stream's
//! frame rate, so repeated seeks never drift.
//!
//! Seeking jumps to the nearest preceding sync point and decodes forward
//! until the requested frame's presentation time is reached: best effort,
//! frame-accurate where the container's timestamps allow it.
//!
//! # Example
//!
//! ```no_run
//! use frameledger::FrameReader;
//!
//! let mut reader = FrameReader::from_path("input.mp4")?;
//! println!("{} frames @ {:.2} fps", reader.total_frames(), reader.frames_per_second());
//!
//! if let Some(frame) = reader.seek_to_timestamp(2_000)? {
//!     println!("frame {} at {} ms", frame.frame_index, frame.timestamp_ms);
//! }
//! while let Some(frame) = reader.read_next()? {
//!     if frame.frame_index >= 90 {
//!         break;
//!     }
//! }
//! # Ok::<(), frameledger::FrameLedgerError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, RgbImage};

use crate::{
    error::FrameLedgerError,
    utilities::{
        frame_index_to_ms, frame_index_to_seek_target, frame_to_buffer, ms_to_frame_index,
        pts_to_frame_index,
    },
};

/// Consecutive unreadable packets tolerated before decoding gives up.
const MAX_PACKET_READ_ERRORS: u32 = 64;

/// A decoded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based index in the source video.
    pub frame_index: u64,
    /// `round(frame_index / fps * 1000)`.
    pub timestamp_ms: u64,
    /// Decoded pixels in RGB8.
    pub image: DynamicImage,
}

struct DecodeSession {
    path: PathBuf,
    input: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    stream_index: usize,
    time_base: Rational,
    decoded: VideoFrame,
    scaled: VideoFrame,
    eof_sent: bool,
}

impl DecodeSession {
    /// Decode the next video frame into `self.decoded`.
    ///
    /// Returns `false` once the stream is exhausted.
    fn decode_next(&mut self) -> Result<bool, FrameLedgerError> {
        let mut read_errors = 0_u32;
        loop {
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                return Ok(true);
            }
            if self.eof_sent {
                return Ok(false);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    read_errors = 0;
                    if packet.stream() == self.stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    read_errors += 1;
                    if read_errors >= MAX_PACKET_READ_ERRORS {
                        return Err(FrameLedgerError::DecodeError(format!(
                            "too many unreadable packets in {}: {error}",
                            self.path.display()
                        )));
                    }
                }
            }
        }
    }

    /// Frame index implied by the decoded frame's presentation time.
    fn decoded_frame_index(&self, frames_per_second: f64) -> Option<u64> {
        self.decoded
            .timestamp()
            .or_else(|| self.decoded.pts())
            .map(|pts| pts_to_frame_index(pts, self.time_base, frames_per_second))
    }

    fn convert(&mut self, width: u32, height: u32) -> Result<DynamicImage, FrameLedgerError> {
        self.scaler.run(&self.decoded, &mut self.scaled)?;
        let buffer = frame_to_buffer(&self.scaled, width, height, 3);
        let image = RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            FrameLedgerError::DecodeError(
                "Failed to construct RGB image from decoded frame data".to_string(),
            )
        })?;
        Ok(DynamicImage::ImageRgb8(image))
    }
}

/// Stateful random-access reader over a single video.
///
/// A closed reader (fresh from [`FrameReader::new`] or after
/// [`close`](FrameReader::close)) answers every read with `Ok(None)` and
/// reports a position of `0`.
pub struct FrameReader {
    session: Option<DecodeSession>,
    frames_per_second: f64,
    total_frames: u64,
    width: u32,
    height: u32,
    /// Index the next sequential read will be labelled with.
    next_frame_index: u64,
    /// Index of the most recently returned frame.
    last_frame_index: Option<u64>,
}

impl Debug for FrameReader {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FrameReader")
            .field("path", &self.path())
            .field("frames_per_second", &self.frames_per_second)
            .field("total_frames", &self.total_frames)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("next_frame_index", &self.next_frame_index)
            .finish_non_exhaustive()
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Create a closed reader.
    pub fn new() -> Self {
        Self {
            session: None,
            frames_per_second: 0.0,
            total_frames: 0,
            width: 0,
            height: 0,
            next_frame_index: 0,
            last_frame_index: None,
        }
    }

    /// Create a reader and open `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, FrameLedgerError> {
        let mut reader = Self::new();
        reader.open(path)?;
        Ok(reader)
    }

    /// Open a video, closing any previously open one first.
    ///
    /// Caches the frame rate, frame count, and dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`FrameLedgerError::OpenError`] if the file cannot be opened,
    /// has no video stream, or its decoder cannot be created.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<(), FrameLedgerError> {
        self.close();

        let path = path.as_ref();
        let open_error = |reason: String| FrameLedgerError::OpenError {
            path: path.to_path_buf(),
            reason,
        };

        log::debug!("Opening video for random access: {}", path.display());

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;
        let input =
            ffmpeg_next::format::input(&path).map_err(|error| open_error(error.to_string()))?;

        let (stream_index, time_base, frames_per_second, reported_frames, decoder) = {
            let stream = input
                .streams()
                .best(Type::Video)
                .ok_or_else(|| open_error("no video stream".to_string()))?;

            let frames_per_second = [stream.avg_frame_rate(), stream.rate()]
                .into_iter()
                .map(rational_to_f64)
                .find(|&fps| fps > 0.0)
                .unwrap_or(0.0);

            let decoder_context = CodecContext::from_parameters(stream.parameters())
                .map_err(|error| open_error(format!("Failed to read codec parameters: {error}")))?;
            let decoder = decoder_context
                .decoder()
                .video()
                .map_err(|error| open_error(format!("Failed to create video decoder: {error}")))?;

            (
                stream.index(),
                stream.time_base(),
                frames_per_second,
                stream.frames(),
                decoder,
            )
        };

        let width = decoder.width();
        let height = decoder.height();
        if width == 0 || height == 0 {
            return Err(open_error(format!("invalid dimensions {width}x{height}")));
        }

        let scaler = ScalingContext::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| open_error(format!("Failed to create scaler: {error}")))?;

        let total_frames = if reported_frames > 0 {
            reported_frames as u64
        } else if input.duration() > 0 && frames_per_second > 0.0 {
            let seconds = input.duration() as f64 / ffmpeg_next::ffi::AV_TIME_BASE as f64;
            (seconds * frames_per_second).round() as u64
        } else {
            0
        };

        self.frames_per_second = frames_per_second;
        self.total_frames = total_frames;
        self.width = width;
        self.height = height;
        self.session = Some(DecodeSession {
            path: path.to_path_buf(),
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            decoded: VideoFrame::empty(),
            scaled: VideoFrame::empty(),
            eof_sent: false,
        });

        log::debug!(
            "Opened {}: {}x{} @ {:.3} fps, {} frames",
            path.display(),
            width,
            height,
            frames_per_second,
            total_frames
        );
        Ok(())
    }

    /// Release the decode session. Safe to call repeatedly or when closed.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            log::debug!("Closing {}", session.path.display());
        }
        *self = Self::new();
    }

    /// Whether a video is open.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Path of the open video.
    pub fn path(&self) -> Option<&Path> {
        self.session.as_ref().map(|session| session.path.as_path())
    }

    /// Native frame rate of the open video, `0.0` when closed.
    pub fn frames_per_second(&self) -> f64 {
        self.frames_per_second
    }

    /// Frame count of the open video, `0` when closed or unknown.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Frame width in pixels, `0` when closed.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels, `0` when closed.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Decode the next sequential frame.
    ///
    /// Returns `Ok(None)` at end of stream or when no video is open.
    pub fn read_next(&mut self) -> Result<Option<Frame>, FrameLedgerError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        if !session.decode_next()? {
            return Ok(None);
        }
        let image = session.convert(self.width, self.height)?;

        let frame_index = self.next_frame_index;
        self.next_frame_index += 1;
        Ok(Some(self.emit(frame_index, image)))
    }

    /// Position the cursor at `frame_index`, then read that frame.
    ///
    /// Returns `Ok(None)` past the end of the stream or when no video is
    /// open.
    pub fn seek_to_frame(&mut self, frame_index: u64) -> Result<Option<Frame>, FrameLedgerError> {
        let frames_per_second = self.frames_per_second;
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        if self.total_frames > 0 && frame_index >= self.total_frames {
            return Ok(None);
        }

        log::debug!("Seeking {} to frame {frame_index}", session.path.display());

        let target = frame_index_to_seek_target(frame_index, frames_per_second);
        session.input.seek(target, ..target)?;
        session.decoder.flush();
        session.eof_sent = false;

        loop {
            if !session.decode_next()? {
                return Ok(None);
            }
            match session.decoded_frame_index(frames_per_second) {
                Some(landed) if landed < frame_index => continue,
                _ => break,
            }
        }
        let image = session.convert(self.width, self.height)?;

        self.next_frame_index = frame_index + 1;
        Ok(Some(self.emit(frame_index, image)))
    }

    /// Position the cursor at the frame nearest `timestamp_ms`, then read it.
    ///
    /// The timestamp is converted to a frame index first, so the returned
    /// frame's `timestamp_ms` is the index-derived value.
    pub fn seek_to_timestamp(&mut self, timestamp_ms: u64) -> Result<Option<Frame>, FrameLedgerError> {
        if !self.is_open() {
            return Ok(None);
        }
        let frame_index = ms_to_frame_index(timestamp_ms, self.frames_per_second);
        self.seek_to_frame(frame_index)
    }

    /// Timestamp of the most recently returned frame; `0` when closed or
    /// before the first read.
    pub fn current_position_ms(&self) -> u64 {
        if !self.is_open() {
            return 0;
        }
        self.last_frame_index
            .map(|index| frame_index_to_ms(index, self.frames_per_second))
            .unwrap_or(0)
    }

    fn emit(&mut self, frame_index: u64, image: DynamicImage) -> Frame {
        self.last_frame_index = Some(frame_index);
        Frame {
            frame_index,
            timestamp_ms: frame_index_to_ms(frame_index, self.frames_per_second),
            image,
        }
    }
}

fn rational_to_f64(rate: Rational) -> f64 {
    if rate.denominator() == 0 {
        0.0
    } else {
        f64::from(rate.numerator()) / f64::from(rate.denominator())
    }
}
