#![warn(missing_docs)]
//! # screen-veil-app
//!
//! ## Purpose
//! Orchestrates masking, smart pause, capture, upload, and the widget for one
//! injection into a host page, and guards the page against duplicate
//! injections.
//!
//! ## Responsibilities
//! - Tear down a previous injection before creating any state ([`bootstrap`]).
//! - Route page events, platform callbacks, widget commands, and messages.
//! - Fan component events out to the widget and to [`SessionObserver`]s.
//! - Block navigation while a capture is in flight.
//! - Remove every listener, DOM node, and feedback class on [`SessionManager::dispose`].
//!
//! ## Data flow
//! Bootstrap -> stored masks applied -> widget mounted -> commands start the
//! capture -> key holds pause it and lift masks -> stop finalizes the asset
//! -> upload request handed to the embedder -> [`SessionManager::on_upload_finished`]
//! -> delayed teardown.
//!
//! ## Ownership and lifetimes
//! The page is shared through `Rc<RefCell<Page>>` because it outlives every
//! injection. The page's teardown slot holds only a `Weak` handle to the
//! live manager, so the page never keeps a disposed manager alive.
//!
//! ## Error model
//! Subsystem failures are wrapped in [`AppError`]. Soft failures (rejected
//! permission, invalid selectors, failed uploads) are absorbed into widget
//! status and logs, never surfaced to the host page.
//!
//! ## Security and privacy notes
//! - Capture is blocked when the kill switch is off.
//! - Logs carry sizes and phases, never recorded bytes or storage payloads.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, info, warn};
use screen_veil_capture::{CaptureBackend, CaptureError, CaptureSession, SessionConfig, SessionEvent};
use screen_veil_core::{
    CoreError, InboundMessage, MaskTool, MediaChunk, PrivacyConfig, ReadyAck, RecorderConfig,
    SessionPhase, UploadMetadata,
};
use screen_veil_mask::{
    MaskError, MaskingEngine, PAUSED_CLASS, PEEKING_CLASS, WIDGET_ROOT_ID, is_inside_widget,
};
use screen_veil_page::{
    ElementId, EventKind, KeyEvent, ListenerId, ListenerPhase, ObserverId, Page, PageError,
    PointerEvent,
};
use screen_veil_pause::{PauseEvent, SmartPauseController};
use screen_veil_storage::{KeyValueStore, OriginKey, SelectorPersistence};
use screen_veil_ui::{Command, FloatingControlWidget};
use screen_veil_upload::{
    HttpResponse, UploadClient, UploadEnvelope, UploadError, UploadTransport, status_text,
};
use thiserror::Error;

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("SCREEN_VEIL_VERSION");

/// Confirmation text returned by the navigation guard.
pub const NAVIGATION_PROMPT: &str = "The recording in progress will be lost.";

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Parameters of one injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitRequest {
    /// Tutorial title.
    pub title: String,
    /// Target module identifier.
    pub module_id: String,
    /// Whether privacy editing starts enabled.
    pub privacy_mode: bool,
}

impl InitRequest {
    /// Extracts the request carried by an `INIT_RECORDER` message.
    pub fn from_message(message: &InboundMessage) -> Option<Self> {
        match message {
            InboundMessage::InitRecorder {
                title,
                module_id,
                is_privacy_mode,
            } => Some(Self {
                title: title.clone(),
                module_id: module_id.clone(),
                privacy_mode: *is_privacy_mode,
            }),
            InboundMessage::TogglePrivacyMode { .. } => None,
        }
    }
}

/// Platform collaborators handed to an injection.
pub struct Dependencies {
    /// Timing, endpoint, and kill-switch settings.
    pub config: RecorderConfig,
    /// Durable per-origin storage.
    pub store: Rc<dyn KeyValueStore>,
    /// Display capture backend.
    pub capture: Box<dyn CaptureBackend>,
    /// HTTP transport carried by every [`UploadRequest`].
    pub transport: Arc<dyn UploadTransport>,
}

/// Upload handed to the embedder.
///
/// Sending does not touch the manager, so it can run while the page keeps
/// delivering events, or on another thread. The answer goes back through
/// [`SessionManager::on_upload_finished`].
pub struct UploadRequest {
    /// Multipart request to send.
    pub envelope: UploadEnvelope,
    transport: Arc<dyn UploadTransport>,
}

impl UploadRequest {
    /// Sends the request through the configured transport.
    ///
    /// # Errors
    /// Returns [`UploadError::Network`] when no HTTP answer was received.
    pub fn send(&self) -> Result<HttpResponse, UploadError> {
        self.transport.send(&self.envelope)
    }
}

struct PendingUpload {
    envelope: UploadEnvelope,
    bytes: usize,
    handed_off: bool,
}

/// State change reported to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Capture phase changed.
    Phase(SessionPhase),
    /// Smart pause engaged (`true`) or released (`false`).
    SmartPause(bool),
    /// Privacy editing settings changed.
    Privacy(PrivacyConfig),
    /// Status line changed.
    Status(String),
    /// Injection torn down.
    Disposed,
}

/// Observer interface for embedders (extension shell, tests).
pub trait SessionObserver {
    /// Receives one notification.
    fn notify(&self, notification: &Notification);
}

/// Flat status snapshot for simple projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStatus {
    /// Capture phase.
    pub phase: SessionPhase,
    /// Elapsed recording time, `mm:ss`.
    pub timer: String,
    /// Privacy editing settings.
    pub privacy: PrivacyConfig,
    /// Whether smart pause holds the capture.
    pub smart_paused: bool,
    /// Status line text.
    pub status: Option<String>,
    /// Number of active mask rules.
    pub mask_rules: usize,
}

#[derive(Debug, Clone, Copy)]
struct GlobalListeners {
    mouse_down: ListenerId,
    key_down: ListenerId,
    key_up: ListenerId,
    before_unload: ListenerId,
}

impl GlobalListeners {
    fn install(page: &mut Page) -> Self {
        Self {
            mouse_down: page.add_event_listener(EventKind::MouseDown, ListenerPhase::Capture),
            key_down: page.add_event_listener(EventKind::KeyDown, ListenerPhase::Capture),
            key_up: page.add_event_listener(EventKind::KeyUp, ListenerPhase::Capture),
            before_unload: page.add_event_listener(EventKind::BeforeUnload, ListenerPhase::Bubble),
        }
    }

    fn remove(self, page: &mut Page) {
        for id in [self.mouse_down, self.key_down, self.key_up, self.before_unload] {
            page.remove_event_listener(id);
        }
    }
}

/// Owned session manager for one injection.
pub struct SessionManager {
    page: Rc<RefCell<Page>>,
    config: RecorderConfig,
    metadata: UploadMetadata,
    masking: MaskingEngine,
    pause: SmartPauseController,
    session: CaptureSession,
    widget: FloatingControlWidget,
    uploader: UploadClient,
    upload: Option<PendingUpload>,
    listeners: Option<GlobalListeners>,
    observer: Option<ObserverId>,
    widget_root: Option<ElementId>,
    teardown_at_ms: Option<u64>,
    subscribers: Vec<Box<dyn SessionObserver>>,
    disposed: bool,
}

/// Bootstraps an injection on `page`.
///
/// Runs the teardown hook of any previous injection before creating state or
/// DOM, then loads and applies stored masks, mounts the widget, installs the
/// global listeners and mutation observer, and registers a new hook.
///
/// # Errors
/// Returns [`AppError::Core`] for invalid configuration or metadata and
/// [`AppError::Upload`] for an invalid endpoint; both are checked before the
/// previous injection is touched. DOM failures return [`AppError::Page`].
pub fn bootstrap(
    page: &Rc<RefCell<Page>>,
    request: InitRequest,
    deps: Dependencies,
    now_ms: u64,
) -> Result<Rc<RefCell<SessionManager>>, AppError> {
    deps.config.validate()?;
    let metadata = UploadMetadata::new(request.title.clone(), request.module_id.clone())?;
    let uploader = UploadClient::new(&deps.config.upload_endpoint, deps.transport)?;

    let previous = page.borrow_mut().take_teardown_hook();
    if let Some(teardown) = previous {
        info!("tearing down previous injection");
        teardown();
    }

    let origin = OriginKey::from_url(page.borrow().url());
    let mut masking = MaskingEngine::load(origin, SelectorPersistence::new(deps.store));
    let mut widget = FloatingControlWidget::new(request.title, APP_VERSION, &deps.config);

    let (widget_root, listeners, observer) = {
        let mut page = page.borrow_mut();
        masking.install_styles(&mut page, deps.config.mask_appearance());
        let report = masking.apply_all(&mut page);
        debug!(
            "initial mask pass: {} elements, {} invalid rules",
            report.matched,
            report.invalid.len()
        );
        if request.privacy_mode {
            masking.enable_editing(&mut page);
        }
        widget.set_privacy(masking.config());

        let root = mount_widget(&mut page)?;
        let listeners = GlobalListeners::install(&mut page);
        let body = page.body();
        let observer = page.observe_mutations(body);
        (root, listeners, observer)
    };

    let manager = Rc::new(RefCell::new(SessionManager {
        page: Rc::clone(page),
        pause: SmartPauseController::from_config(&deps.config),
        session: CaptureSession::new(deps.capture, SessionConfig::from_recorder(&deps.config)),
        config: deps.config,
        metadata,
        masking,
        widget,
        uploader,
        upload: None,
        listeners: Some(listeners),
        observer: Some(observer),
        widget_root: Some(widget_root),
        teardown_at_ms: None,
        subscribers: Vec::new(),
        disposed: false,
    }));
    manager.borrow_mut().process(now_ms);

    let weak = Rc::downgrade(&manager);
    page.borrow_mut().install_teardown_hook(Box::new(move || {
        if let Some(manager) = weak.upgrade() {
            manager.borrow_mut().dispose();
        }
    }));

    info!("injection ready (version {APP_VERSION})");
    Ok(manager)
}

/// Handles an `INIT_RECORDER` message: bootstraps and acknowledges.
///
/// # Errors
/// Returns [`AppError::UnexpectedMessage`] for other actions and propagates
/// [`bootstrap`] errors.
pub fn init_from_message(
    page: &Rc<RefCell<Page>>,
    message: &InboundMessage,
    deps: Dependencies,
    now_ms: u64,
) -> Result<(Rc<RefCell<SessionManager>>, ReadyAck), AppError> {
    let request = InitRequest::from_message(message).ok_or(AppError::UnexpectedMessage)?;
    let manager = bootstrap(page, request, deps, now_ms)?;
    Ok((manager, ReadyAck::ok(APP_VERSION)))
}

/// Sends the manager's pending upload, if any, and reports the answer back.
///
/// The manager is not borrowed while the transport runs. Returns `true` when
/// a request was sent.
pub fn drive_upload(manager: &RefCell<SessionManager>, now_ms: u64) -> bool {
    let Some(request) = manager.borrow_mut().take_upload_request() else {
        return false;
    };
    let response = request.send();
    manager.borrow_mut().on_upload_finished(response, now_ms);
    true
}

fn mount_widget(page: &mut Page) -> Result<ElementId, PageError> {
    if let Some(stale) = page.get_element_by_id(WIDGET_ROOT_ID) {
        warn!("removing orphaned widget root");
        page.remove(stale);
    }

    let root = page.create_element("div");
    page.set_element_id(root, WIDGET_ROOT_ID);
    let body = page.body();
    page.append_child(body, root)?;
    page.attach_shadow(root)?;
    Ok(root)
}

impl SessionManager {
    /// Registers an observer.
    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) {
        self.subscribers.push(observer);
    }

    /// Current capture phase.
    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Returns `true` after [`SessionManager::dispose`].
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Widget state.
    pub fn widget(&self) -> &FloatingControlWidget {
        &self.widget
    }

    /// Masking engine state.
    pub fn masking(&self) -> &MaskingEngine {
        &self.masking
    }

    /// Capture session state.
    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    /// Widget host element while mounted.
    pub fn widget_root(&self) -> Option<ElementId> {
        self.widget_root
    }

    /// Pending post-upload teardown instant.
    pub fn teardown_at_ms(&self) -> Option<u64> {
        self.teardown_at_ms
    }

    /// Flat status snapshot at `now_ms`.
    pub fn status_snapshot(&self, now_ms: u64) -> RuntimeStatus {
        RuntimeStatus {
            phase: self.session.phase(),
            timer: screen_veil_ui::format_elapsed(self.session.elapsed_ms(now_ms)),
            privacy: self.masking.config(),
            smart_paused: self.pause.is_paused(),
            status: self.widget.status().map(str::to_string),
            mask_rules: self.masking.rules().count(),
        }
    }

    /// Executes a widget command.
    ///
    /// `Discard` and `Close` both abandon the capture and dispose the
    /// injection. `Stop` during smart pause releases the hold first.
    ///
    /// # Errors
    /// Returns [`AppError::CommandUnavailable`] for commands the widget does
    /// not offer in the current state, [`AppError::Disposed`] after teardown,
    /// and subsystem errors from capture start or mask clearing.
    pub fn handle_command(&mut self, command: Command, now_ms: u64) -> Result<(), AppError> {
        if self.disposed {
            return Err(AppError::Disposed);
        }
        if !self.widget.accepts(command) {
            debug!("ignoring unavailable command {}", command.as_str());
            return Err(AppError::CommandUnavailable(command));
        }

        let outcome = match command {
            Command::Start => self.session.start().map_err(AppError::Capture),
            Command::Pause => {
                self.session.pause(now_ms);
                Ok(())
            }
            Command::Resume => {
                self.session.resume(now_ms);
                Ok(())
            }
            Command::Stop => {
                if self.pause.is_paused() {
                    self.release_smart_pause(now_ms);
                }
                self.session.stop(now_ms);
                Ok(())
            }
            Command::Retry => {
                self.session.retry_upload();
                Ok(())
            }
            Command::Discard | Command::Close => {
                self.session.discard();
                self.dispose();
                return Ok(());
            }
            Command::TogglePrivacy => {
                let enabled = !self.masking.config().enabled;
                self.set_privacy_mode(enabled);
                Ok(())
            }
            Command::SelectTool(tool) => {
                self.select_tool(tool);
                Ok(())
            }
            Command::ClearMasks => {
                let mut page = self.page.borrow_mut();
                self.masking.clear_all(&mut page).map_err(AppError::Mask)
            }
            Command::SmartResume => {
                self.pause.request_resume(now_ms);
                Ok(())
            }
            Command::Minimize => {
                self.widget.minimize();
                Ok(())
            }
            Command::Expand => {
                self.widget.expand();
                Ok(())
            }
        };

        self.process(now_ms);
        outcome
    }

    /// Handles a message delivered after bootstrap. Returns `true` when it
    /// changed state.
    pub fn handle_message(&mut self, message: &InboundMessage, now_ms: u64) -> bool {
        if self.disposed {
            return false;
        }
        match message {
            InboundMessage::TogglePrivacyMode { active } => {
                self.set_privacy_mode(*active);
                self.process(now_ms);
                true
            }
            InboundMessage::InitRecorder { .. } => {
                debug!("INIT_RECORDER must go through bootstrap");
                false
            }
        }
    }

    /// Capturing `mouseover`.
    pub fn handle_mouse_over(&mut self, target: ElementId) {
        if self.disposed {
            return;
        }
        let mut page = self.page.borrow_mut();
        self.masking.handle_mouse_over(&mut page, target);
    }

    /// Capturing `mouseout`.
    pub fn handle_mouse_out(&mut self, target: ElementId) {
        if self.disposed {
            return;
        }
        let mut page = self.page.borrow_mut();
        self.masking.handle_mouse_out(&mut page, target);
    }

    /// Capturing `click`; consumes editing clicks.
    pub fn handle_click(&mut self, event: &mut PointerEvent, now_ms: u64) {
        if self.disposed {
            return;
        }
        let toggled = {
            let mut page = self.page.borrow_mut();
            self.masking.handle_click(&mut page, event)
        };
        if toggled.is_some() {
            self.process(now_ms);
        }
    }

    /// Capturing `mousedown`; draws a click ripple while recording.
    pub fn handle_mouse_down(&mut self, event: &PointerEvent, now_ms: u64) {
        if self.disposed || self.session.phase() != SessionPhase::Recording {
            return;
        }
        if is_inside_widget(&self.page.borrow(), event.target) {
            return;
        }
        self.widget.add_ripple(event.client_x, event.client_y, now_ms);
        self.render();
    }

    /// Capturing `keydown`.
    pub fn handle_key_down(&mut self, event: &KeyEvent, now_ms: u64) {
        if self.disposed {
            return;
        }
        let recording = self.session.phase() == SessionPhase::Recording;
        self.pause.on_key_down(event, now_ms, recording);
        self.process(now_ms);
    }

    /// Capturing `keyup`.
    pub fn handle_key_up(&mut self, event: &KeyEvent, now_ms: u64) {
        if self.disposed {
            return;
        }
        self.pause.on_key_up(event);
        self.process(now_ms);
    }

    /// `beforeunload`; returns the confirmation prompt while capturing.
    pub fn handle_before_unload(&self) -> Option<&'static str> {
        if !self.disposed && self.session.phase().is_capturing() {
            Some(NAVIGATION_PROMPT)
        } else {
            None
        }
    }

    /// Stream granted by the platform.
    pub fn on_stream_granted(&mut self, now_ms: u64) {
        self.session.on_stream_granted(now_ms);
        self.process(now_ms);
    }

    /// Permission prompt dismissed.
    pub fn on_stream_rejected(&mut self, now_ms: u64) {
        self.session.on_stream_rejected();
        self.process(now_ms);
    }

    /// Recorder delivered a time slice.
    pub fn on_chunk(&mut self, chunk: MediaChunk) {
        self.session.on_chunk(chunk);
    }

    /// User ended the share from the browser UI.
    pub fn on_track_ended(&mut self, now_ms: u64) {
        self.session.on_track_ended(now_ms);
        self.process(now_ms);
    }

    /// Recorder flushed after stop.
    pub fn on_recorder_stopped(&mut self, now_ms: u64) {
        self.session.on_recorder_stopped();
        self.process(now_ms);
    }

    /// Returns `true` while an upload waits to be sent or answered.
    pub fn has_pending_upload(&self) -> bool {
        self.upload.is_some()
    }

    /// Hands the prepared upload to the embedder. Returns `None` when
    /// nothing is waiting or the request was already handed off.
    pub fn take_upload_request(&mut self) -> Option<UploadRequest> {
        if self.disposed {
            return None;
        }
        let pending = self.upload.as_mut().filter(|pending| !pending.handed_off)?;
        pending.handed_off = true;
        debug!("upload {} handed off", pending.envelope.file_name);
        Some(UploadRequest {
            envelope: pending.envelope.clone(),
            transport: self.uploader.transport(),
        })
    }

    /// Transport answered the upload request.
    ///
    /// Ignored once the session was discarded or the injection disposed.
    pub fn on_upload_finished(&mut self, response: Result<HttpResponse, UploadError>, now_ms: u64) {
        let Some(pending) = self.upload.take() else {
            debug!("late upload answer ignored");
            return;
        };
        let outcome = self
            .uploader
            .settle(&pending.envelope, pending.bytes, response)
            .map(|_| ())
            .map_err(|error| status_text(&error));
        self.session.complete_upload(outcome);
        self.process(now_ms);
    }

    /// Page loop tick: mutation flush, timers, delayed teardown.
    pub fn tick(&mut self, now_ms: u64) {
        if self.disposed {
            return;
        }

        self.flush_mutations();
        self.session.on_tick(now_ms);
        let recording = self.session.phase() == SessionPhase::Recording;
        self.pause.on_tick(now_ms, recording);
        self.process(now_ms);

        if self.disposed {
            return;
        }
        let elapsed_ms = self.session.elapsed_ms(now_ms);
        if self.widget.tick(now_ms, elapsed_ms) {
            self.render();
        }

        if self.teardown_at_ms.is_some_and(|due| now_ms >= due) {
            info!("post-upload teardown");
            self.dispose();
        }
    }

    /// Removes the widget, every global listener, the mutation observer, and
    /// page-wide feedback classes; stops an active capture. Mask effects stay.
    /// Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if !self.session.phase().is_terminal() {
            self.session.discard();
        }
        self.session.drain_events();
        self.pause.reset();
        self.upload = None;
        self.teardown_at_ms = None;

        {
            let mut page = self.page.borrow_mut();
            self.masking.set_peek(&mut page, false);
            self.masking.disable_editing(&mut page);
            if let Some(listeners) = self.listeners.take() {
                listeners.remove(&mut page);
            }
            if let Some(observer) = self.observer.take() {
                page.disconnect_observer(observer);
            }
            let body = page.body();
            page.remove_class(body, PAUSED_CLASS);
            page.remove_class(body, PEEKING_CLASS);
            if let Some(root) = self.widget_root.take() {
                page.remove(root);
            }
            drop(page.take_teardown_hook());
        }

        info!("injection disposed");
        self.notify(&Notification::Disposed);
    }

    fn set_privacy_mode(&mut self, enabled: bool) {
        {
            let mut page = self.page.borrow_mut();
            if enabled {
                self.masking.enable_editing(&mut page);
            } else {
                self.masking.disable_editing(&mut page);
            }
        }
        self.sync_privacy();
    }

    fn select_tool(&mut self, tool: MaskTool) {
        self.masking.set_tool(tool);
        self.sync_privacy();
    }

    fn sync_privacy(&mut self) {
        let privacy = self.masking.config();
        if self.widget.privacy() != privacy {
            self.widget.set_privacy(privacy);
            self.notify(&Notification::Privacy(privacy));
        }
    }

    fn flush_mutations(&mut self) {
        let Some(observer) = self.observer else {
            return;
        };
        let mut page = self.page.borrow_mut();
        if page.take_mutation_records(observer) > 0 {
            let report = self.masking.apply_all(&mut page);
            debug!("mutation batch re-applied masks to {} elements", report.matched);
        }
    }

    /// Drains component events until quiescent, then re-renders.
    fn process(&mut self, now_ms: u64) {
        loop {
            let pause_events = self.pause.drain_events();
            for event in &pause_events {
                self.apply_pause_event(*event, now_ms);
            }
            let session_events = self.session.drain_events();
            for event in &session_events {
                self.apply_session_event(event, now_ms);
            }
            if pause_events.is_empty() && session_events.is_empty() {
                break;
            }
        }
        self.render();
    }

    fn apply_pause_event(&mut self, event: PauseEvent, now_ms: u64) {
        match event {
            PauseEvent::Engaged => {
                self.session.pause(now_ms);
                self.masking.set_peek(&mut self.page.borrow_mut(), true);
                self.widget
                    .on_smart_pause(true, now_ms, self.session.elapsed_ms(now_ms));
                self.notify(&Notification::SmartPause(true));
            }
            PauseEvent::Released => {
                self.session.resume(now_ms);
                self.end_peek(now_ms);
            }
            PauseEvent::ResumeCountdown(value) => self.widget.set_resume_countdown(value),
        }
    }

    fn apply_session_event(&mut self, event: &SessionEvent, now_ms: u64) {
        match event {
            SessionEvent::PhaseChanged { from, to } => {
                let elapsed_ms = self.session.elapsed_ms(now_ms);
                self.widget.on_phase(*to, now_ms, elapsed_ms);
                {
                    let mut page = self.page.borrow_mut();
                    let body = page.body();
                    if *to == SessionPhase::Paused {
                        page.add_class(body, PAUSED_CLASS);
                    } else if *from == SessionPhase::Paused {
                        page.remove_class(body, PAUSED_CLASS);
                    }
                }
                if !to.is_capturing() && self.pause.is_paused() {
                    self.pause.reset();
                    self.masking.set_peek(&mut self.page.borrow_mut(), false);
                    self.widget.on_smart_pause(false, now_ms, elapsed_ms);
                }
                self.notify(&Notification::Phase(*to));

                match to {
                    SessionPhase::Uploading => self.dispatch_upload(now_ms),
                    SessionPhase::Done => {
                        self.teardown_at_ms = Some(now_ms.saturating_add(self.config.teardown_delay_ms));
                        self.notify_status();
                    }
                    _ => {}
                }
            }
            SessionEvent::CountdownTick(value) => self.widget.set_countdown(*value),
            SessionEvent::PermissionDenied | SessionEvent::CountdownAborted => {
                self.widget.on_permission_denied();
                self.notify_status();
            }
            SessionEvent::AssetReady { bytes } => debug!("asset ready for upload: {bytes} bytes"),
            SessionEvent::UploadFailed { detail } => {
                self.widget.on_upload_failed(detail.clone());
                self.notify_status();
            }
        }
    }

    /// Drops the smart-pause hold without resuming, restoring masks and
    /// the widget.
    fn release_smart_pause(&mut self, now_ms: u64) {
        self.pause.reset();
        self.end_peek(now_ms);
    }

    fn end_peek(&mut self, now_ms: u64) {
        self.masking.set_peek(&mut self.page.borrow_mut(), false);
        self.widget
            .on_smart_pause(false, now_ms, self.session.elapsed_ms(now_ms));
        self.notify(&Notification::SmartPause(false));
    }

    fn dispatch_upload(&mut self, now_ms: u64) {
        let Some(asset) = self.session.begin_upload() else {
            debug!("upload skipped: session discarded");
            return;
        };
        let envelope = self.uploader.build_envelope(asset, &self.metadata, now_ms);
        let bytes = asset.bytes.len();
        info!("upload of {bytes} bytes ready for hand-off");

        self.upload = Some(PendingUpload {
            envelope,
            bytes,
            handed_off: false,
        });
        self.notify_status();
    }

    fn notify_status(&self) {
        if let Some(status) = self.widget.status() {
            self.notify(&Notification::Status(status.to_string()));
        }
    }

    fn notify(&self, notification: &Notification) {
        for subscriber in &self.subscribers {
            subscriber.notify(notification);
        }
    }

    fn render(&mut self) {
        let Some(root) = self.widget_root else {
            return;
        };
        let (stylesheet, markup) = self.widget.render();
        if let Err(error) = self
            .page
            .borrow_mut()
            .set_shadow_content(root, stylesheet, markup)
        {
            warn!("widget render skipped: {error}");
        }
    }
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration or metadata validation failed.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    /// Page structure operation failed.
    #[error("page error: {0}")]
    Page(#[from] PageError),
    /// Capture subsystem error.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    /// Masking subsystem error.
    #[error("mask error: {0}")]
    Mask(#[from] MaskError),
    /// Upload configuration error.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
    /// Message is not valid at this point.
    #[error("unexpected message")]
    UnexpectedMessage,
    /// Widget does not offer the command in the current state.
    #[error("command unavailable: {}", .0.as_str())]
    CommandUnavailable(Command),
    /// Injection already torn down.
    #[error("injection disposed")]
    Disposed,
}
