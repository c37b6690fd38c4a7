//! Validates contract fixtures and runtime payloads against frozen JSON schemas.

use jsonschema::JSONSchema;
use screen_veil_app::app_version;
use screen_veil_core::{InboundMessage, ReadyAck};
use screen_veil_upload::error_detail;
use serde_json::Value;

const CONTRACTS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts");

fn load_raw(relative: &str) -> String {
    std::fs::read_to_string(format!("{CONTRACTS_DIR}/{relative}"))
        .expect("json file should be readable")
}

fn load_json(relative: &str) -> Value {
    serde_json::from_str(&load_raw(relative)).expect("json file should be valid")
}

fn compile_validator(schema: &str) -> JSONSchema {
    let schema = load_json(schema);
    JSONSchema::compile(&schema).expect("schema should compile")
}

#[test]
fn init_recorder_fixture_matches_schema_and_parses() {
    let validator = compile_validator("init-recorder.schema.json");
    let fixture = load_json("fixtures/init-recorder.valid.json");
    assert!(
        validator.is_valid(&fixture),
        "init fixture should validate against schema"
    );

    let message = InboundMessage::from_json(&load_raw("fixtures/init-recorder.valid.json"))
        .expect("fixture should parse");
    assert_eq!(
        message,
        InboundMessage::InitRecorder {
            title: "Cancel an invoice".to_string(),
            module_id: "42".to_string(),
            is_privacy_mode: true,
        }
    );
}

#[test]
fn init_recorder_without_module_is_rejected_by_schema_and_parser() {
    let validator = compile_validator("init-recorder.schema.json");
    let fixture = load_json("fixtures/init-recorder.invalid.json");
    assert!(!validator.is_valid(&fixture));
    assert!(InboundMessage::from_json(&load_raw("fixtures/init-recorder.invalid.json")).is_err());
}

#[test]
fn toggle_privacy_fixture_matches_schema_and_parses() {
    let validator = compile_validator("toggle-privacy-mode.schema.json");
    assert!(validator.is_valid(&load_json("fixtures/toggle-privacy-mode.valid.json")));

    let message = InboundMessage::from_json(&load_raw("fixtures/toggle-privacy-mode.valid.json"))
        .expect("fixture should parse");
    assert_eq!(message, InboundMessage::TogglePrivacyMode { active: false });
}

#[test]
fn ready_ack_emitted_at_runtime_matches_schema() {
    let validator = compile_validator("ready-ack.schema.json");
    let ack = serde_json::to_value(ReadyAck::ok(app_version())).expect("ack should encode");
    assert!(
        validator.is_valid(&ack),
        "runtime ack should validate against schema"
    );
}

#[test]
fn upload_error_fixture_matches_schema_and_surfaces_detail() {
    let validator = compile_validator("upload-error.schema.json");
    assert!(validator.is_valid(&load_json("fixtures/upload-error.valid.json")));
    assert_eq!(
        error_detail(&load_raw("fixtures/upload-error.valid.json")),
        "disk full"
    );
}

#[test]
fn mask_rules_fixture_matches_schema() {
    let validator = compile_validator("mask-rules.schema.json");
    assert!(validator.is_valid(&load_json("fixtures/mask-rules.valid.json")));
    assert!(!validator.is_valid(&serde_json::json!(["#a", "#a"])));
}
