//! Stable per-video identity.
//!
//! A video's identity is a fingerprint of where it lives and what the
//! filesystem says about it, not of its content: the resolved path, the size
//! in bytes, and the modification time in nanoseconds are hashed together.
//! The same file at the same path with unchanged size and mtime always maps to
//! the same identity, so per-video storage folders can be named
//! deterministically across runs without re-reading the video.
//!
//! # Example
//!
//! ```no_run
//! use frameledger::identity::video_folder_name;
//!
//! let folder = video_folder_name("clips/match_01.mp4", 8)?;
//! assert!(folder.starts_with("match_01__"));
//! # Ok::<(), frameledger::FrameLedgerError>(())
//! ```

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use sha2::{Digest, Sha256};

use crate::error::FrameLedgerError;

/// Hash length used when callers have no preference.
pub const DEFAULT_HASH_LENGTH: usize = 8;

/// Derive the per-video folder name `"{stem}__{short_hash}"`.
///
/// # Errors
///
/// Returns [`FrameLedgerError::NotFound`] if `video_path` does not resolve
/// to an existing file.
pub fn video_folder_name<P: AsRef<Path>>(
    video_path: P,
    hash_length: usize,
) -> Result<String, FrameLedgerError> {
    let video_path = video_path.as_ref();
    let short_hash = short_hash_for_path(video_path, hash_length)?;
    let stem = video_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(format!("{stem}__{short_hash}"))
}

/// Compute the truncated hex digest of `path|size|mtime_ns`.
///
/// `hash_length` is clamped to the digest's 64 hex characters.
///
/// # Errors
///
/// Returns [`FrameLedgerError::NotFound`] if the path is missing or is not
/// a regular file.
pub fn short_hash_for_path<P: AsRef<Path>>(
    path: P,
    hash_length: usize,
) -> Result<String, FrameLedgerError> {
    let path = path.as_ref();
    let resolved = resolve(path)?;
    let stat = fs::metadata(&resolved).map_err(|error| not_found_or_io(path, error))?;
    if !stat.is_file() {
        return Err(FrameLedgerError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let modified_ns = nanos_since_epoch(stat.modified()?);
    let payload = format!("{}|{}|{}", resolved.display(), stat.len(), modified_ns);

    let digest = format!("{:x}", Sha256::digest(payload.as_bytes()));
    let length = hash_length.min(digest.len());
    log::debug!("Identity for {}: {}", resolved.display(), &digest[..length]);
    Ok(digest[..length].to_string())
}

/// Signed offset from the Unix epoch, negative for earlier times.
fn nanos_since_epoch(time: SystemTime) -> i128 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_nanos() as i128,
        Err(before) => -(before.duration().as_nanos() as i128),
    }
}

fn resolve(path: &Path) -> Result<PathBuf, FrameLedgerError> {
    fs::canonicalize(path).map_err(|error| not_found_or_io(path, error))
}

fn not_found_or_io(path: &Path, error: std::io::Error) -> FrameLedgerError {
    if error.kind() == ErrorKind::NotFound {
        FrameLedgerError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        FrameLedgerError::IoError(error)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn times_before_the_epoch_stay_distinct() {
        let one = UNIX_EPOCH - Duration::from_secs(1);
        let two = UNIX_EPOCH - Duration::from_secs(2);
        assert_eq!(nanos_since_epoch(one), -1_000_000_000);
        assert_eq!(nanos_since_epoch(two), -2_000_000_000);
        assert_eq!(nanos_since_epoch(UNIX_EPOCH), 0);
        assert_eq!(nanos_since_epoch(UNIX_EPOCH + Duration::from_nanos(7)), 7);
    }
}
