//! Random-access reader integration tests.

use std::path::Path;

use frameledger::{FrameLedgerError, FrameReader};

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

fn expected_ms(frame_index: u64, frames_per_second: f64) -> u64 {
    (frame_index as f64 / frames_per_second * 1000.0).round() as u64
}

#[test]
fn closed_reader_yields_nothing() {
    let mut reader = FrameReader::new();
    assert!(!reader.is_open());
    assert!(reader.read_next().expect("read").is_none());
    assert!(reader.seek_to_frame(10).expect("seek").is_none());
    assert!(reader.seek_to_timestamp(1_000).expect("seek").is_none());
    assert_eq!(reader.current_position_ms(), 0);
    assert_eq!(reader.frames_per_second(), 0.0);

    reader.close();
    reader.close();
    assert!(!reader.is_open());
}

#[test]
fn open_nonexistent_file() {
    let result = FrameReader::from_path("this_file_does_not_exist.mp4");
    assert!(
        matches!(result, Err(FrameLedgerError::OpenError { .. })),
        "expected OpenError, got {result:?}"
    );
}

#[test]
fn open_invalid_file() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let invalid_file_path = temporary_directory.path().join("invalid.mp4");
    std::fs::write(&invalid_file_path, b"this is not a media file")
        .expect("Failed to write invalid file");

    let mut reader = FrameReader::new();
    let result = reader.open(&invalid_file_path);
    assert!(matches!(result, Err(FrameLedgerError::OpenError { .. })));
    assert!(!reader.is_open());
}

#[test]
fn sequential_reads_count_up() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut reader = FrameReader::from_path(path).expect("open");
    assert!(reader.is_open());
    assert!(reader.frames_per_second() > 0.0);
    assert!(reader.total_frames() > 0);
    assert!(reader.width() > 0 && reader.height() > 0);
    assert_eq!(reader.current_position_ms(), 0);

    for expected_index in 0..5 {
        let frame = reader.read_next().expect("read").expect("frame");
        assert_eq!(frame.frame_index, expected_index);
        assert_eq!(
            frame.timestamp_ms,
            expected_ms(expected_index, reader.frames_per_second())
        );
        assert_eq!(frame.image.width(), reader.width());
        assert_eq!(reader.current_position_ms(), frame.timestamp_ms);
    }
}

#[test]
fn seeks_are_consistent() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut reader = FrameReader::from_path(path).expect("open");
    let fps = reader.frames_per_second();
    let target = (reader.total_frames() / 2).max(1);

    let frame = reader.seek_to_frame(target).expect("seek").expect("frame");
    assert_eq!(frame.frame_index, target);
    assert_eq!(frame.timestamp_ms, expected_ms(target, fps));

    let next = reader.read_next().expect("read").expect("frame");
    assert_eq!(next.frame_index, target + 1);

    // Backwards after forwards.
    let first = reader.seek_to_frame(0).expect("seek").expect("frame");
    assert_eq!(first.frame_index, 0);
    assert_eq!(first.timestamp_ms, 0);

    let by_time = reader
        .seek_to_timestamp(frame.timestamp_ms)
        .expect("seek")
        .expect("frame");
    assert_eq!(by_time.frame_index, target);
    assert_eq!(reader.current_position_ms(), frame.timestamp_ms);
}

#[test]
fn seeking_past_the_end_yields_nothing() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut reader = FrameReader::from_path(path).expect("open");
    let beyond = reader.total_frames() + 1_000;
    assert!(reader.seek_to_frame(beyond).expect("seek").is_none());
}

#[test]
fn reopen_replaces_the_session() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut reader = FrameReader::from_path(path).expect("open");
    reader.seek_to_frame(3).expect("seek");
    reader.open(path).expect("reopen");
    assert_eq!(reader.current_position_ms(), 0);
    let frame = reader.read_next().expect("read").expect("frame");
    assert_eq!(frame.frame_index, 0);

    reader.close();
    assert!(!reader.is_open());
    assert_eq!(reader.current_position_ms(), 0);
}
