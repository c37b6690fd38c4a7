//! Tests phase classification helpers and upload metadata validation.

use screen_veil_core::{SessionPhase, UploadMetadata};

#[test]
fn phase_model_tests_only_recording_and_paused_are_capturing() {
    let capturing: Vec<SessionPhase> = [
        SessionPhase::Idle,
        SessionPhase::AwaitingPermission,
        SessionPhase::Countdown,
        SessionPhase::Recording,
        SessionPhase::Paused,
        SessionPhase::Stopping,
        SessionPhase::Uploading,
        SessionPhase::Done,
        SessionPhase::Error,
        SessionPhase::Cancelled,
    ]
    .into_iter()
    .filter(|phase| phase.is_capturing())
    .collect();

    assert_eq!(capturing, vec![SessionPhase::Recording, SessionPhase::Paused]);
    assert!(SessionPhase::Done.is_terminal());
    assert!(!SessionPhase::Error.is_terminal());
}

#[test]
fn phase_model_tests_metadata_requires_module_id() {
    assert!(UploadMetadata::new("Title", "  ").is_err());
    let metadata = UploadMetadata::new("", "7").expect("blank title is allowed");
    assert_eq!(metadata.module_id, "7");
}
