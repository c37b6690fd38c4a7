//! Integration tests for upload packaging and failure mapping.

use std::sync::{Arc, Mutex};

use screen_veil_core::{RecordedAsset, UploadMetadata};
use screen_veil_upload::{
    CONNECTION_ERROR_TEXT, FailureClass, HttpResponse, UploadClient, UploadEnvelope, UploadError,
    UploadTransport, classify_upload_error, idempotency_key_for_asset, status_text,
};

#[derive(Debug)]
struct ScriptedTransport {
    answers: Mutex<Vec<Result<HttpResponse, UploadError>>>,
    sent: Mutex<Vec<UploadEnvelope>>,
}

impl ScriptedTransport {
    fn new(answers: Vec<Result<HttpResponse, UploadError>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers),
            sent: Mutex::new(Vec::new()),
        })
    }
}

impl UploadTransport for ScriptedTransport {
    fn send(&self, envelope: &UploadEnvelope) -> Result<HttpResponse, UploadError> {
        self.sent
            .lock()
            .expect("sent lock should work")
            .push(envelope.clone());
        self.answers
            .lock()
            .expect("answer lock should work")
            .remove(0)
    }
}

fn asset() -> RecordedAsset {
    RecordedAsset {
        mime_type: "video/webm".to_string(),
        bytes: vec![0x1a, 0x45, 0xdf, 0xa3],
        chunk_count: 2,
        duration_ms: 12_000,
    }
}

fn metadata() -> UploadMetadata {
    UploadMetadata::new("Cancel an invoice", "42").expect("metadata should build")
}

fn ok() -> Result<HttpResponse, UploadError> {
    Ok(HttpResponse {
        status: 200,
        body: r#"{"id": 7}"#.to_string(),
    })
}

#[test]
fn upload_client_tests_multipart_form_carries_file_title_and_module() {
    let _ = env_logger::builder().is_test(true).try_init();
    let transport = ScriptedTransport::new(vec![ok()]);
    let client = UploadClient::new("http://localhost:8000/api/v1/upload", transport.clone())
        .expect("client should build");

    let report = client
        .upload(&asset(), &metadata(), 1_700_000_000_000)
        .expect("upload should succeed");
    assert_eq!(report.status, 200);
    assert_eq!(report.bytes, 4);

    let sent = transport.sent.lock().expect("sent lock should work");
    let envelope = &sent[0];
    assert_eq!(envelope.file_name, "capture_1700000000000.webm");
    assert!(envelope.content_type.starts_with("multipart/form-data; boundary="));

    let body = String::from_utf8_lossy(&envelope.body);
    assert!(body.contains(
        "Content-Disposition: form-data; name=\"file\"; filename=\"capture_1700000000000.webm\"\r\nContent-Type: video/webm"
    ));
    assert!(body.contains("name=\"title\"\r\n\r\nCancel an invoice\r\n"));
    assert!(body.contains("name=\"module_id\"\r\n\r\n42\r\n"));
    assert!(body.trim_end().ends_with("--"));
}

#[test]
fn upload_client_tests_server_detail_is_surfaced_verbatim() {
    let transport = ScriptedTransport::new(vec![Ok(HttpResponse {
        status: 500,
        body: r#"{"detail":"disk full"}"#.to_string(),
    })]);
    let client = UploadClient::new("http://localhost:8000/api/v1/upload", transport)
        .expect("client should build");

    let error = client
        .upload(&asset(), &metadata(), 1)
        .expect_err("upload should fail");
    assert_eq!(
        error,
        UploadError::Rejected {
            status: 500,
            detail: "disk full".to_string()
        }
    );
    assert_eq!(status_text(&error), "disk full");
    assert_eq!(classify_upload_error(&error), FailureClass::Retriable);
}

#[test]
fn upload_client_tests_network_failure_maps_to_connection_error() {
    let transport = ScriptedTransport::new(vec![Err(UploadError::Network(
        "connection refused".to_string(),
    ))]);
    let client = UploadClient::new("http://localhost:8000/api/v1/upload", transport)
        .expect("client should build");

    let error = client
        .upload(&asset(), &metadata(), 1)
        .expect_err("upload should fail");
    assert_eq!(status_text(&error), CONNECTION_ERROR_TEXT);
}

#[test]
fn upload_client_tests_retry_reuses_idempotency_key() {
    let transport = ScriptedTransport::new(vec![
        Ok(HttpResponse {
            status: 503,
            body: String::new(),
        }),
        ok(),
    ]);
    let client = UploadClient::new("http://localhost:8000/api/v1/upload", transport.clone())
        .expect("client should build");

    assert!(client.upload(&asset(), &metadata(), 1).is_err());
    client
        .upload(&asset(), &metadata(), 2)
        .expect("retry should succeed");

    let sent = transport.sent.lock().expect("sent lock should work");
    assert_eq!(sent[0].idempotency_key, sent[1].idempotency_key);
    assert_eq!(
        sent[0].idempotency_key,
        idempotency_key_for_asset(&asset(), &metadata())
    );
    assert_eq!(sent[0].idempotency_key.len(), 64);
}

#[test]
fn upload_client_tests_rejects_non_http_endpoints() {
    let transport = ScriptedTransport::new(Vec::new());
    assert!(matches!(
        UploadClient::new("ftp://example.test/upload", transport.clone()),
        Err(UploadError::InvalidEndpoint(_))
    ));
    assert!(matches!(
        UploadClient::new("not a url", transport),
        Err(UploadError::InvalidEndpoint(_))
    ));
}

#[test]
fn upload_client_tests_client_errors_are_permanent() {
    let error = UploadError::Rejected {
        status: 422,
        detail: "module not found".to_string(),
    };
    assert_eq!(classify_upload_error(&error), FailureClass::Permanent);
}

#[test]
fn upload_client_tests_answer_obtained_elsewhere_is_settled_like_send() {
    let transport = ScriptedTransport::new(vec![ok()]);
    let client = UploadClient::new("http://localhost:8000/api/v1/upload", transport.clone())
        .expect("client should build");
    let envelope = client.build_envelope(&asset(), &metadata(), 5);

    let answer = client.transport().send(&envelope);
    let report = client
        .settle(&envelope, 4, answer)
        .expect("answer should settle");
    assert_eq!(report.status, 200);
    assert_eq!(report.idempotency_key, envelope.idempotency_key);
    assert_eq!(transport.sent.lock().expect("sent lock should work").len(), 1);

    let rejected = client.settle(
        &envelope,
        4,
        Ok(HttpResponse {
            status: 503,
            body: r#"{"detail": "busy"}"#.to_string(),
        }),
    );
    assert!(matches!(
        rejected,
        Err(UploadError::Rejected { status: 503, ref detail }) if detail == "busy"
    ));
}
