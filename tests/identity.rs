//! Video identity integration tests.

use std::{
    fs::{self, File},
    time::{Duration, SystemTime},
};

use frameledger::{FrameLedgerError, short_hash_for_path, video_folder_name};

#[test]
fn identity_is_deterministic() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let video = temporary_directory.path().join("clip.mp4");
    fs::write(&video, b"not really a video").expect("write");

    let first = video_folder_name(&video, 8).expect("folder name");
    let second = video_folder_name(&video, 8).expect("folder name");
    assert_eq!(first, second);
    assert!(first.starts_with("clip__"), "unexpected folder name: {first}");
    assert_eq!(first.len(), "clip__".len() + 8);
    assert!(first["clip__".len()..].chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn hash_length_is_respected() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let video = temporary_directory.path().join("a.mov");
    fs::write(&video, b"abc").expect("write");

    let short = short_hash_for_path(&video, 4).expect("hash");
    let long = short_hash_for_path(&video, 16).expect("hash");
    assert_eq!(short.len(), 4);
    assert_eq!(long.len(), 16);
    assert!(long.starts_with(&short));
}

#[test]
fn size_change_changes_identity() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let video = temporary_directory.path().join("clip.mp4");
    fs::write(&video, b"0123456789").expect("write");
    let fixed_time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    File::options()
        .write(true)
        .open(&video)
        .and_then(|file| file.set_modified(fixed_time))
        .expect("set mtime");
    let before = short_hash_for_path(&video, 8).expect("hash");

    fs::write(&video, b"0123456789abcdef").expect("rewrite");
    File::options()
        .write(true)
        .open(&video)
        .and_then(|file| file.set_modified(fixed_time))
        .expect("set mtime");
    let after = short_hash_for_path(&video, 8).expect("hash");

    assert_ne!(before, after);
}

#[test]
fn modification_time_changes_identity() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let video = temporary_directory.path().join("clip.mp4");
    fs::write(&video, b"same bytes").expect("write");

    let file = File::options().write(true).open(&video).expect("open");
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000))
        .expect("set mtime");
    let before = short_hash_for_path(&video, 8).expect("hash");

    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(2_000))
        .expect("set mtime");
    let after = short_hash_for_path(&video, 8).expect("hash");

    assert_ne!(before, after);
}

#[test]
fn missing_file_is_not_found() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let missing = temporary_directory.path().join("missing.mp4");

    let result = video_folder_name(&missing, 8);
    assert!(
        matches!(result, Err(FrameLedgerError::NotFound { .. })),
        "expected NotFound, got {result:?}"
    );
}

#[test]
fn directory_is_not_a_video() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let result = short_hash_for_path(temporary_directory.path(), 8);
    assert!(matches!(result, Err(FrameLedgerError::NotFound { .. })));
}
