//! Shared fixtures for app integration tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use screen_veil_app::{
    Dependencies, InitRequest, Notification, SessionManager, SessionObserver, bootstrap,
};
use screen_veil_capture::SyntheticCaptureBackend;
use screen_veil_core::{MediaChunk, RecorderConfig};
use screen_veil_page::{ElementId, Page};
use screen_veil_storage::MemoryStore;
use screen_veil_ui::Command;
use screen_veil_upload::{HttpResponse, UploadEnvelope, UploadError, UploadTransport};

/// Transport answering from a script; answers `200 {}` once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    answers: Mutex<Vec<Result<HttpResponse, UploadError>>>,
    sent: Mutex<Vec<UploadEnvelope>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new(answers: Vec<Result<HttpResponse, UploadError>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<UploadEnvelope> {
        self.sent.lock().expect("sent lock should work").clone()
    }
}

impl UploadTransport for ScriptedTransport {
    fn send(&self, envelope: &UploadEnvelope) -> Result<HttpResponse, UploadError> {
        self.sent
            .lock()
            .expect("sent lock should work")
            .push(envelope.clone());
        let mut answers = self.answers.lock().expect("answer lock should work");
        if answers.is_empty() {
            return Ok(HttpResponse {
                status: 200,
                body: "{}".to_string(),
            });
        }
        answers.remove(0)
    }
}

/// Observer collecting every notification.
#[allow(dead_code)]
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    pub seen: Rc<RefCell<Vec<Notification>>>,
}

impl SessionObserver for RecordingObserver {
    fn notify(&self, notification: &Notification) {
        self.seen.borrow_mut().push(notification.clone());
    }
}

/// Page with an `#ssn-field` input under body.
#[allow(dead_code)]
pub struct Fixture {
    pub page: Rc<RefCell<Page>>,
    pub ssn_field: ElementId,
    pub store: MemoryStore,
    pub backend: SyntheticCaptureBackend,
    pub transport: Arc<ScriptedTransport>,
}

#[allow(dead_code)]
impl Fixture {
    pub fn new() -> Self {
        Self::with_answers(Vec::new())
    }

    pub fn with_answers(answers: Vec<Result<HttpResponse, UploadError>>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut page = Page::new("https://erp.example.test/profile").expect("page should build");
        let field = page.create_element("input");
        page.set_element_id(field, "ssn-field");
        let body = page.body();
        page.append_child(body, field).expect("append should work");

        Self {
            page: Rc::new(RefCell::new(page)),
            ssn_field: field,
            store: MemoryStore::new(),
            backend: SyntheticCaptureBackend::new(),
            transport: ScriptedTransport::new(answers),
        }
    }

    pub fn deps(&self, config: RecorderConfig) -> Dependencies {
        Dependencies {
            config,
            store: Rc::new(self.store.clone()),
            capture: Box::new(self.backend.clone()),
            transport: self.transport.clone(),
        }
    }

    pub fn inject(&self, privacy_mode: bool) -> Rc<RefCell<SessionManager>> {
        self.inject_with(RecorderConfig::default(), privacy_mode)
    }

    pub fn inject_with(
        &self,
        config: RecorderConfig,
        privacy_mode: bool,
    ) -> Rc<RefCell<SessionManager>> {
        let request = InitRequest {
            title: "Cancel an invoice".to_string(),
            module_id: "42".to_string(),
            privacy_mode,
        };
        bootstrap(&self.page, request, self.deps(config), 0).expect("bootstrap should succeed")
    }
}

/// Drives start, permission grant, and the default 3 s countdown; returns the
/// instant recording began.
#[allow(dead_code)]
pub fn start_recording(manager: &mut SessionManager, granted_at_ms: u64) -> u64 {
    manager
        .handle_command(Command::Start, granted_at_ms)
        .expect("start should be offered");
    manager.on_stream_granted(granted_at_ms);
    for step in 1..=3 {
        manager.tick(granted_at_ms + step * 1_000);
    }
    granted_at_ms + 3_000
}

/// Feeds `count` one-byte chunks.
#[allow(dead_code)]
pub fn feed_chunks(manager: &mut SessionManager, count: u64) {
    for sequence in 0..count {
        manager.on_chunk(MediaChunk::new(sequence, vec![sequence as u8 + 1]));
    }
}

/// Plays the embedder: sends the handed-off upload and reports the answer.
#[allow(dead_code)]
pub fn send_upload(manager: &mut SessionManager, now_ms: u64) {
    let request = manager
        .take_upload_request()
        .expect("an upload should be waiting");
    let response = request.send();
    manager.on_upload_finished(response, now_ms);
}
