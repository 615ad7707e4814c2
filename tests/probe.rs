//! Video probing integration tests, driven by stand-in `ffprobe` scripts.

#![cfg(unix)]

mod common;

use frameledger::{FrameLedgerError, VideoProbe};

const TEN_SECONDS_AT_30: &str = r#"cat <<'JSON'
{
    "programs": [],
    "streams": [
        {
            "width": 640,
            "height": 360,
            "r_frame_rate": "30/1",
            "avg_frame_rate": "30/1",
            "nb_frames": "300"
        }
    ],
    "format": {
        "duration": "10.000000"
    }
}
JSON"#;

#[test]
fn probe_reports_stream_metadata() {
    let _guard = common::tool_lock();
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let ffprobe = common::write_script(temporary_directory.path(), "ffprobe", TEN_SECONDS_AT_30);
    let video = common::placeholder_video(temporary_directory.path(), "clip.mp4");

    let metadata = VideoProbe::new(&ffprobe).probe(&video).expect("probe");
    assert_eq!(metadata.path, video);
    assert_eq!(metadata.duration_seconds, 10.0);
    assert_eq!(metadata.frames_per_second, 30.0);
    assert_eq!((metadata.width, metadata.height), (640, 360));
    assert_eq!(metadata.total_frames, 300);
    assert_eq!(metadata.duration_ms(), 10_000);
}

#[test]
fn missing_frame_count_is_estimated() {
    let _guard = common::tool_lock();
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let ffprobe = common::write_script(
        temporary_directory.path(),
        "ffprobe",
        r#"echo '{"streams":[{"width":1920,"height":1080,"avg_frame_rate":"30000/1001","r_frame_rate":"30000/1001"}],"format":{"duration":"2.002"}}'"#,
    );
    let video = common::placeholder_video(temporary_directory.path(), "clip.mkv");

    let metadata = VideoProbe::new(&ffprobe).probe(&video).expect("probe");
    assert!((metadata.frames_per_second - 29.97).abs() < 0.01);
    assert_eq!(metadata.total_frames, 60);
}

#[test]
fn no_video_stream() {
    let _guard = common::tool_lock();
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let ffprobe = common::write_script(
        temporary_directory.path(),
        "ffprobe",
        r#"echo '{"streams":[],"format":{"duration":"3.0"}}'"#,
    );
    let video = common::placeholder_video(temporary_directory.path(), "audio.m4a");

    let result = VideoProbe::new(&ffprobe).probe(&video);
    assert!(
        matches!(result, Err(FrameLedgerError::NoStream)),
        "expected NoStream, got {result:?}"
    );
}

#[test]
fn zero_fields_are_incomplete() {
    let _guard = common::tool_lock();
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let ffprobe = common::write_script(
        temporary_directory.path(),
        "ffprobe",
        r#"echo '{"streams":[{"width":640,"height":0,"avg_frame_rate":"0/0","r_frame_rate":"0/0"}],"format":{}}'"#,
    );
    let video = common::placeholder_video(temporary_directory.path(), "broken.mp4");

    match VideoProbe::new(&ffprobe).probe(&video) {
        Err(FrameLedgerError::IncompleteMetadata(detail)) => {
            assert!(detail.contains("height"), "detail: {detail}");
            assert!(detail.contains("fps"), "detail: {detail}");
            assert!(detail.contains("duration"), "detail: {detail}");
            assert!(!detail.contains("width"), "detail: {detail}");
        }
        other => panic!("expected IncompleteMetadata, got {other:?}"),
    }
}

#[test]
fn failing_process_carries_diagnostics() {
    let _guard = common::tool_lock();
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let ffprobe = common::write_script(
        temporary_directory.path(),
        "ffprobe",
        "echo 'clip.mp4: Invalid data found when processing input' >&2\nexit 1",
    );
    let video = common::placeholder_video(temporary_directory.path(), "clip.mp4");

    match VideoProbe::new(&ffprobe).probe(&video) {
        Err(FrameLedgerError::ProcessError {
            program,
            diagnostics,
        }) => {
            assert_eq!(program, "ffprobe");
            assert!(diagnostics.contains("Invalid data found"));
        }
        other => panic!("expected ProcessError, got {other:?}"),
    }
}

#[test]
fn garbage_output_is_malformed() {
    let _guard = common::tool_lock();
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let ffprobe = common::write_script(temporary_directory.path(), "ffprobe", "echo 'not json'");
    let video = common::placeholder_video(temporary_directory.path(), "clip.mp4");

    let result = VideoProbe::new(&ffprobe).probe(&video);
    assert!(matches!(
        result,
        Err(FrameLedgerError::MalformedProbeOutput(_))
    ));
}

#[test]
fn missing_video_is_not_found() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let result =
        VideoProbe::new("/nonexistent/ffprobe").probe(temporary_directory.path().join("gone.mp4"));
    assert!(matches!(result, Err(FrameLedgerError::NotFound { .. })));
}

#[test]
fn missing_executable_is_a_spawn_error() {
    let _guard = common::tool_lock();
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let video = common::placeholder_video(temporary_directory.path(), "clip.mp4");
    let result = VideoProbe::new(temporary_directory.path().join("no-such-ffprobe")).probe(&video);
    assert!(matches!(result, Err(FrameLedgerError::Spawn { .. })));
}

#[test]
fn probe_many_reports_each_file() {
    let _guard = common::tool_lock();
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let ffprobe = common::write_script(temporary_directory.path(), "ffprobe", TEN_SECONDS_AT_30);
    let video = common::placeholder_video(temporary_directory.path(), "clip.mp4");
    let missing = temporary_directory.path().join("missing.mp4");

    let results = VideoProbe::new(&ffprobe).probe_many(&[video, missing]);
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(FrameLedgerError::NotFound { .. })));
}
