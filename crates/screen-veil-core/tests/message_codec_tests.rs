//! Tests inter-process message decoding.

use screen_veil_core::{InboundMessage, ReadyAck};

#[test]
fn message_codec_tests_accepts_numeric_module_id() {
    let raw = r#"{"action":"INIT_RECORDER","title":"Onboarding","moduleId":42,"isPrivacyMode":true}"#;
    let message = InboundMessage::from_json(raw).expect("init message should parse");

    assert_eq!(
        message,
        InboundMessage::InitRecorder {
            title: "Onboarding".to_string(),
            module_id: "42".to_string(),
            is_privacy_mode: true,
        }
    );
}

#[test]
fn message_codec_tests_defaults_privacy_flag_to_off() {
    let raw = r#"{"action":"INIT_RECORDER","title":"t","moduleId":"m-7"}"#;
    let message = InboundMessage::from_json(raw).expect("init message should parse");

    assert!(matches!(
        message,
        InboundMessage::InitRecorder { is_privacy_mode: false, .. }
    ));
}

#[test]
fn message_codec_tests_parses_toggle_and_rejects_unknown_actions() {
    let toggle = InboundMessage::from_json(r#"{"action":"TOGGLE_PRIVACY_MODE","active":false}"#)
        .expect("toggle should parse");
    assert_eq!(toggle, InboundMessage::TogglePrivacyMode { active: false });

    assert!(InboundMessage::from_json(r#"{"action":"SELF_DESTRUCT"}"#).is_err());
}

#[test]
fn message_codec_tests_ack_serializes_status_ok() {
    let encoded = serde_json::to_value(ReadyAck::ok("0.1.0")).expect("ack should encode");
    assert_eq!(encoded["status"], "ok");
    assert_eq!(encoded["version"], "0.1.0");
}
