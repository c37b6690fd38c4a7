#![warn(missing_docs)]
//! # screen-veil-upload
//!
//! ## Purpose
//! Packages a finalized recording for the upload endpoint and interprets the
//! endpoint's answer.
//!
//! ## Responsibilities
//! - Validate the endpoint URL.
//! - Build the multipart form (`file`, `title`, `module_id`).
//! - Derive a stable idempotency key so a retried upload is recognisable.
//! - Map failures to the status line shown in the widget.
//!
//! ## Data flow
//! [`RecordedAsset`] + [`UploadMetadata`] -> [`UploadClient::build_envelope`]
//! -> [`UploadTransport::send`] -> [`UploadReport`] or [`UploadError`].
//!
//! ## Error model
//! Non-2xx answers become [`UploadError::Rejected`] with the server's
//! `detail` verbatim; transport failures become [`UploadError::Network`].
//! Retrying is a user decision, so the client never retries on its own.

use std::sync::Arc;

use log::{debug, error, info};
use rand::Rng;
use screen_veil_core::{RecordedAsset, UploadMetadata};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Status text for transport-level failures.
pub const CONNECTION_ERROR_TEXT: &str = "Connection error";
/// Status text when an error body carries no usable detail.
pub const UNKNOWN_ERROR_TEXT: &str = "Unknown error";
/// Header carrying the idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Multipart request ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEnvelope {
    /// Target endpoint.
    pub endpoint: String,
    /// Full `Content-Type` header value including the boundary.
    pub content_type: String,
    /// Value of the [`IDEMPOTENCY_HEADER`] header.
    pub idempotency_key: String,
    /// File name of the `file` part.
    pub file_name: String,
    /// Encoded multipart body.
    pub body: Vec<u8>,
}

/// Minimal HTTP answer returned by transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

impl HttpResponse {
    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Final HTTP status.
    pub status: u16,
    /// Idempotency key sent with the request.
    pub idempotency_key: String,
    /// Uploaded asset size.
    pub bytes: usize,
}

/// Transport abstraction used by the upload client.
pub trait UploadTransport: Send + Sync {
    /// Sends one request.
    ///
    /// # Errors
    /// Returns [`UploadError::Network`] when no HTTP answer was received.
    fn send(&self, envelope: &UploadEnvelope) -> Result<HttpResponse, UploadError>;
}

/// Whether repeating the same request can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Server or network trouble; a retry may succeed.
    Retriable,
    /// The request itself was refused.
    Permanent,
}

/// Upload client bound to one validated endpoint.
#[derive(Clone)]
pub struct UploadClient {
    endpoint: Url,
    transport: Arc<dyn UploadTransport>,
}

impl UploadClient {
    /// Creates a client for `endpoint`.
    ///
    /// # Errors
    /// Returns [`UploadError::InvalidEndpoint`] for unparsable or non-http(s)
    /// URLs.
    pub fn new(endpoint: &str, transport: Arc<dyn UploadTransport>) -> Result<Self, UploadError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|error| UploadError::InvalidEndpoint(format!("invalid upload url: {error}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(UploadError::InvalidEndpoint(
                "upload endpoint must use http or https".to_string(),
            ));
        }
        Ok(Self {
            endpoint,
            transport,
        })
    }

    /// Configured endpoint.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Builds the multipart request for `asset`.
    ///
    /// The file part is named `capture_<now_ms>.webm`.
    pub fn build_envelope(
        &self,
        asset: &RecordedAsset,
        metadata: &UploadMetadata,
        now_ms: u64,
    ) -> UploadEnvelope {
        let boundary = random_boundary();
        let file_name = format!("capture_{now_ms}.webm");

        let mut body = Vec::with_capacity(asset.bytes.len() + 512);
        push_part_header(
            &mut body,
            &boundary,
            &format!("form-data; name=\"file\"; filename=\"{file_name}\""),
            Some(&asset.mime_type),
        );
        body.extend_from_slice(&asset.bytes);
        body.extend_from_slice(b"\r\n");
        push_text_part(&mut body, &boundary, "title", &metadata.title);
        push_text_part(&mut body, &boundary, "module_id", &metadata.module_id);
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        UploadEnvelope {
            endpoint: self.endpoint.to_string(),
            content_type: format!("multipart/form-data; boundary={boundary}"),
            idempotency_key: idempotency_key_for_asset(asset, metadata),
            file_name,
            body,
        }
    }

    /// Sends `asset` once.
    ///
    /// # Errors
    /// Returns [`UploadError::Rejected`] for non-2xx answers and propagates
    /// transport errors.
    pub fn upload(
        &self,
        asset: &RecordedAsset,
        metadata: &UploadMetadata,
        now_ms: u64,
    ) -> Result<UploadReport, UploadError> {
        let envelope = self.build_envelope(asset, metadata, now_ms);
        self.send(&envelope, asset.bytes.len())
    }

    /// Sends a prepared envelope.
    ///
    /// # Errors
    /// See [`UploadClient::upload`].
    pub fn send(&self, envelope: &UploadEnvelope, bytes: usize) -> Result<UploadReport, UploadError> {
        debug!(
            "uploading {} ({bytes} bytes, key {})",
            envelope.file_name, envelope.idempotency_key
        );
        self.settle(envelope, bytes, self.transport.send(envelope))
    }

    /// Transport shared with requests sent outside the client.
    pub fn transport(&self) -> Arc<dyn UploadTransport> {
        Arc::clone(&self.transport)
    }

    /// Interprets the transport answer for `envelope`.
    ///
    /// # Errors
    /// Returns [`UploadError::Rejected`] for non-2xx answers and passes
    /// transport errors through.
    pub fn settle(
        &self,
        envelope: &UploadEnvelope,
        bytes: usize,
        response: Result<HttpResponse, UploadError>,
    ) -> Result<UploadReport, UploadError> {
        let response = response.inspect_err(|failure| {
            error!("upload transport failure: {failure}");
        })?;

        if !response.is_success() {
            let detail = error_detail(&response.body);
            error!("upload rejected with status {}: {detail}", response.status);
            return Err(UploadError::Rejected {
                status: response.status,
                detail,
            });
        }

        info!("upload accepted with status {}", response.status);
        Ok(UploadReport {
            status: response.status,
            idempotency_key: envelope.idempotency_key.clone(),
            bytes,
        })
    }
}

/// Returns a stable SHA-256 hex key over asset bytes and metadata.
pub fn idempotency_key_for_asset(asset: &RecordedAsset, metadata: &UploadMetadata) -> String {
    let mut hasher = Sha256::new();
    hasher.update(&asset.bytes);
    hasher.update(metadata.title.as_bytes());
    hasher.update([0_u8]);
    hasher.update(metadata.module_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extracts the `detail` of an error body.
///
/// String details are returned verbatim; structured details are returned as
/// compact JSON. Bodies without a detail yield [`UNKNOWN_ERROR_TEXT`].
pub fn error_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return UNKNOWN_ERROR_TEXT.to_string();
    };

    match value.get("detail") {
        Some(serde_json::Value::String(detail)) if !detail.is_empty() => detail.clone(),
        Some(serde_json::Value::Null) | None => UNKNOWN_ERROR_TEXT.to_string(),
        Some(serde_json::Value::String(_)) => UNKNOWN_ERROR_TEXT.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Status line text for a failed upload.
pub fn status_text(error: &UploadError) -> String {
    match error {
        UploadError::Rejected { detail, .. } => detail.clone(),
        UploadError::Network(_) => CONNECTION_ERROR_TEXT.to_string(),
        UploadError::InvalidEndpoint(message) => message.clone(),
    }
}

/// Classifies a failure for logging and retry hints.
pub fn classify_upload_error(error: &UploadError) -> FailureClass {
    match error {
        UploadError::Network(_) => FailureClass::Retriable,
        UploadError::Rejected { status, .. } if *status >= 500 || *status == 429 => {
            FailureClass::Retriable
        }
        UploadError::Rejected { .. } | UploadError::InvalidEndpoint(_) => FailureClass::Permanent,
    }
}

fn random_boundary() -> String {
    let mut rng = rand::rng();
    let token: String = (0..24)
        .map(|_| char::from(b"0123456789abcdefghijklmnopqrstuvwxyz"[rng.random_range(0..36_usize)]))
        .collect();
    format!("----screen-veil-{token}")
}

fn push_part_header(body: &mut Vec<u8>, boundary: &str, disposition: &str, content_type: Option<&str>) {
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
    if let Some(content_type) = content_type {
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
    }
    body.extend_from_slice(b"\r\n");
}

fn push_text_part(body: &mut Vec<u8>, boundary: &str, name: &str, value: &str) {
    push_part_header(body, boundary, &format!("form-data; name=\"{name}\""), None);
    body.extend_from_slice(value.as_bytes());
    body.extend_from_slice(b"\r\n");
}

/// Upload error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    /// Endpoint violates URL policy.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// No HTTP answer was received.
    #[error("network failure: {0}")]
    Network(String),
    /// Server answered with a non-2xx status.
    #[error("upload rejected ({status}): {detail}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server detail, verbatim.
        detail: String,
    },
}
