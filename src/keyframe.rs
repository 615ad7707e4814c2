//! Single-frame keyframe capture.
//!
//! A keyframe, in this crate's terms, is one frame the operator chose to
//! keep (not a codec sync point). [`save_keyframe`] writes it under
//! `frames/<video_folder>/keyframes/` using the same deterministic filename
//! scheme as range extraction, and never overwrites an existing file.
//!
//! # Example
//!
//! ```no_run
//! use frameledger::{FrameReader, ProjectLayout, VideoContext, save_frame};
//!
//! let layout = ProjectLayout::init("project")?;
//! let video = VideoContext::for_video(&layout, "clip.mp4")?;
//! let mut reader = FrameReader::from_path("clip.mp4")?;
//!
//! if let Some(frame) = reader.seek_to_frame(120)? {
//!     if let Some(record) = save_frame(&layout, &video, &frame, "jpg")? {
//!         layout.ledger()?.append(&[record])?;
//!     }
//! }
//! # Ok::<(), frameledger::FrameLedgerError>(())
//! ```

use std::{fs, io::Cursor, path::Path};

use image::{DynamicImage, ImageFormat};

use crate::{
    error::FrameLedgerError,
    ledger::{FrameKind, FrameRecord},
    project::{ProjectLayout, VideoContext, frame_filename, normalize_extension},
    reader::Frame,
};

/// Write one keyframe image and return its ledger row.
///
/// Returns `Ok(None)` without writing when a file already exists at the
/// destination. Appending the returned record to the ledger is the caller's
/// job.
///
/// # Errors
///
/// - [`FrameLedgerError::EmptyFrame`] if `image` has zero width or height.
/// - [`FrameLedgerError::UnsupportedImageFormat`] if `ext` has no encoder.
/// - [`FrameLedgerError::WriteFailed`] if both the direct write and the
///   encode-to-memory fallback fail.
pub fn save_keyframe(
    layout: &ProjectLayout,
    video: &VideoContext,
    timestamp_ms: u64,
    frame_index: u64,
    image: &DynamicImage,
    ext: &str,
) -> Result<Option<FrameRecord>, FrameLedgerError> {
    let ext = normalize_extension(ext);
    let filename = frame_filename(timestamp_ms, frame_index, &ext);
    let image_relpath = layout.image_relpath(&video.video_folder, FrameKind::Keyframe, &filename);
    let output_path = layout.resolve(&image_relpath);

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    if output_path.exists() {
        log::debug!("Keyframe already saved: {}", output_path.display());
        return Ok(None);
    }

    if image.width() == 0 || image.height() == 0 {
        return Err(FrameLedgerError::EmptyFrame);
    }

    let format = ImageFormat::from_extension(&ext)
        .ok_or_else(|| FrameLedgerError::UnsupportedImageFormat(ext.clone()))?;

    // JPEG has no alpha channel.
    let converted;
    let encodable = if format == ImageFormat::Jpeg && image.color().has_alpha() {
        converted = DynamicImage::ImageRgb8(image.to_rgb8());
        &converted
    } else {
        image
    };

    // Nothing appears at the destination until the image is fully written.
    let staging_path = output_path.with_file_name(format!(".{filename}.partial"));
    log::debug!("Writing keyframe {}", output_path.display());
    let written = write_image(encodable, &staging_path, format)
        .and_then(|()| fs::rename(&staging_path, &output_path).map_err(|error| error.to_string()));
    if let Err(reason) = written {
        if staging_path.exists() {
            if let Err(error) = fs::remove_file(&staging_path) {
                log::warn!("Failed to remove {}: {error}", staging_path.display());
            }
        }
        return Err(FrameLedgerError::WriteFailed {
            path: output_path,
            reason,
        });
    }

    Ok(Some(FrameRecord {
        video_id: video.video_id.clone(),
        src_video_path: video.src_video_path.clone(),
        timestamp_ms,
        frame_index,
        kind: FrameKind::Keyframe,
        image_relpath,
    }))
}

/// Direct encode to `path`, falling back to encode-in-memory then write.
fn write_image(image: &DynamicImage, path: &Path, format: ImageFormat) -> Result<(), String> {
    let Err(error) = image.save_with_format(path, format) else {
        return Ok(());
    };
    log::warn!(
        "Direct write of {} failed ({error}), retrying via in-memory encode",
        path.display()
    );
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .map_err(|error| error.to_string())?;
    fs::write(path, buffer.into_inner()).map_err(|error| error.to_string())
}

/// [`save_keyframe`] for a frame produced by [`FrameReader`](crate::FrameReader).
pub fn save_frame(
    layout: &ProjectLayout,
    video: &VideoContext,
    frame: &Frame,
    ext: &str,
) -> Result<Option<FrameRecord>, FrameLedgerError> {
    save_keyframe(
        layout,
        video,
        frame.timestamp_ms,
        frame.frame_index,
        &frame.image,
        ext,
    )
}
