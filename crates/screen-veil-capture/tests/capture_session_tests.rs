//! Integration tests for the capture session lifecycle.

use screen_veil_capture::{
    BackendCall, CaptureBackend, CaptureError, CaptureSession, SessionConfig, SessionEvent,
    SyntheticCaptureBackend,
};
use screen_veil_core::{MediaChunk, SessionPhase};

fn session_with(config: SessionConfig) -> (CaptureSession, SyntheticCaptureBackend) {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = SyntheticCaptureBackend::new();
    (CaptureSession::new(Box::new(backend.clone()), config), backend)
}

fn recording_session(started_at_ms: u64) -> (CaptureSession, SyntheticCaptureBackend) {
    let (mut session, backend) = session_with(SessionConfig {
        countdown_secs: 0,
        ..SessionConfig::default()
    });
    session.start().expect("start should work");
    session.on_stream_granted(started_at_ms);
    assert_eq!(session.phase(), SessionPhase::Recording);
    (session, backend)
}

#[test]
fn capture_session_tests_countdown_runs_three_two_one_then_records() {
    let (mut session, backend) = session_with(SessionConfig::default());
    session.start().expect("start should work");
    session.on_stream_granted(0);
    assert_eq!(session.phase(), SessionPhase::Countdown);
    assert_eq!(session.countdown_remaining(), Some(3));

    session.on_tick(1_000);
    session.on_tick(2_000);
    assert_eq!(session.phase(), SessionPhase::Countdown);
    session.on_tick(3_000);
    assert_eq!(session.phase(), SessionPhase::Recording);

    let ticks: Vec<u32> = session
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::CountdownTick(value) => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![3, 2, 1]);
    assert!(backend.calls().contains(&BackendCall::StartRecorder(1_000)));
}

#[test]
fn capture_session_tests_stream_lost_during_countdown_aborts_to_idle() {
    let (mut session, backend) = session_with(SessionConfig::default());
    session.start().expect("start should work");
    session.on_stream_granted(0);
    backend.end_stream();
    session.on_tick(1_000);

    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(session.drain_events().contains(&SessionEvent::CountdownAborted));
    assert!(
        !backend
            .calls()
            .iter()
            .any(|call| matches!(call, BackendCall::StartRecorder(_)))
    );
}

#[test]
fn capture_session_tests_permission_rejection_returns_to_idle() {
    let (mut session, _backend) = session_with(SessionConfig::default());
    session.start().expect("start should work");
    session.on_stream_rejected();

    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(session.drain_events().contains(&SessionEvent::PermissionDenied));
    session.start().expect("a new start is allowed after rejection");
}

#[test]
fn capture_session_tests_kill_switch_blocks_start() {
    let (mut session, backend) = session_with(SessionConfig {
        capture_enabled: false,
        ..SessionConfig::default()
    });
    assert!(matches!(session.start(), Err(CaptureError::Disabled)));
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(backend.calls().is_empty());
}

#[test]
fn capture_session_tests_pause_freezes_elapsed_and_resume_rebaselines() {
    let (mut session, _backend) = recording_session(10_000);
    assert_eq!(session.elapsed_ms(22_000), 12_000);

    assert!(session.pause(22_000));
    assert_eq!(session.elapsed_ms(24_000), 12_000);
    assert_eq!(session.elapsed_ms(27_000), 12_000);

    assert!(session.resume(27_000));
    assert_eq!(session.elapsed_ms(27_000), 12_000);
    assert_eq!(session.elapsed_ms(28_500), 13_500);
}

#[test]
fn capture_session_tests_pause_and_resume_are_no_ops_out_of_phase() {
    let (mut session, backend) = session_with(SessionConfig::default());
    assert!(!session.pause(0));
    assert!(!session.resume(0));
    assert!(!session.stop(0));
    assert!(backend.calls().is_empty());

    let (mut recording, _) = recording_session(0);
    assert!(!recording.resume(100));
    assert!(recording.pause(100));
    assert!(!recording.pause(200));
}

#[test]
fn capture_session_tests_stop_finalizes_chunks_in_arrival_order() {
    let (mut session, backend) = recording_session(0);
    assert!(session.on_chunk(MediaChunk::new(0, vec![1, 2])));
    assert!(!session.on_chunk(MediaChunk::new(1, Vec::new())));
    assert!(session.on_chunk(MediaChunk::new(2, vec![3])));

    assert!(session.stop(4_000));
    assert_eq!(session.phase(), SessionPhase::Stopping);
    assert!(session.on_chunk(MediaChunk::new(3, vec![4])));
    session.on_recorder_stopped();

    assert_eq!(session.phase(), SessionPhase::Uploading);
    let asset = session.begin_upload().expect("asset should be ready");
    assert_eq!(asset.bytes, vec![1, 2, 3, 4]);
    assert_eq!(asset.chunk_count, 3);
    assert_eq!(asset.duration_ms, 4_000);

    let calls = backend.calls();
    assert!(calls.contains(&BackendCall::StopRecorder));
    assert!(calls.contains(&BackendCall::StopTracks));
}

#[test]
fn capture_session_tests_track_end_behaves_like_stop() {
    let (mut session, _backend) = recording_session(0);
    assert!(session.on_track_ended(2_000));
    assert_eq!(session.phase(), SessionPhase::Stopping);
    assert_eq!(session.elapsed_ms(9_000), 2_000);
}

#[test]
fn capture_session_tests_discard_after_stop_suppresses_upload() {
    let (mut session, _backend) = recording_session(0);
    session.on_chunk(MediaChunk::new(0, vec![9]));
    session.stop(1_000);

    assert!(session.discard());
    session.on_recorder_stopped();

    assert_eq!(session.phase(), SessionPhase::Cancelled);
    assert!(session.begin_upload().is_none());
    assert!(session.asset().is_none());
}

#[test]
fn capture_session_tests_discard_while_uploading_ignores_late_completion() {
    let (mut session, _backend) = recording_session(0);
    session.on_chunk(MediaChunk::new(0, vec![9]));
    session.stop(1_000);
    session.on_recorder_stopped();

    assert!(session.discard());
    assert!(session.begin_upload().is_none());
    session.complete_upload(Ok(()));
    assert_eq!(session.phase(), SessionPhase::Cancelled);
    assert!(!session.discard());
}

#[test]
fn capture_session_tests_failed_upload_keeps_asset_for_retry() {
    let (mut session, _backend) = recording_session(0);
    session.on_chunk(MediaChunk::new(0, vec![5, 6]));
    session.stop(1_000);
    session.on_recorder_stopped();

    session.complete_upload(Err("disk full".to_string()));
    assert_eq!(session.phase(), SessionPhase::Error);
    assert_eq!(session.last_error(), Some("disk full"));
    assert!(session.asset().is_some());

    assert!(session.retry_upload());
    assert_eq!(session.phase(), SessionPhase::Uploading);
    assert_eq!(
        session.begin_upload().map(|asset| asset.bytes.clone()),
        Some(vec![5, 6])
    );
    session.complete_upload(Ok(()));
    assert_eq!(session.phase(), SessionPhase::Done);
    assert!(!session.retry_upload());
}

#[test]
fn capture_session_tests_discard_during_permission_prompt_releases_late_stream() {
    let (mut session, backend) = session_with(SessionConfig::default());
    session.start().expect("start should work");
    assert!(session.discard());
    session.on_stream_granted(0);

    assert_eq!(session.phase(), SessionPhase::Cancelled);
    assert!(!backend.stream_active());
}
