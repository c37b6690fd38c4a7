#![warn(missing_docs)]
//! # screen-veil-capture
//!
//! ## Purpose
//! Owns the display stream and recorder lifecycle of one capture session.
//!
//! ## Responsibilities
//! - Define a backend-agnostic trait over the platform capture APIs.
//! - Expose a deterministic synthetic backend for CI and unit tests.
//! - Drive the session phases from permission request to upload outcome.
//! - Account elapsed time excluding paused intervals.
//!
//! ## Data flow
//! Widget command -> [`CaptureSession::start`] -> backend stream request ->
//! [`CaptureSession::on_stream_granted`] -> countdown ticks -> recorder chunks
//! ([`CaptureSession::on_chunk`]) -> [`CaptureSession::stop`] ->
//! [`CaptureSession::on_recorder_stopped`] -> [`RecordedAsset`] -> upload.
//!
//! ## Ownership and lifetimes
//! The session owns its chunks and the finalized asset. The asset stays in
//! the session until upload succeeds so a failed upload can be retried
//! without re-recording.
//!
//! ## Error model
//! A disabled kill switch, out-of-phase starts, and backend failures are
//! reported as [`CaptureError`]. A rejected permission prompt is not an
//! error: the session returns to idle.
//!
//! ## Security and privacy notes
//! Recorded bytes never reach the log; only chunk counts and sizes do.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use screen_veil_core::{ChunkBuffer, MediaChunk, RecordedAsset, RecorderConfig, SessionPhase};
use thiserror::Error;

/// Interval between countdown steps.
pub const COUNTDOWN_STEP_MS: u64 = 1_000;

/// Trait implemented by concrete capture providers.
///
/// Requests are fire-and-forget; completions come back through the session's
/// `on_*` transitions.
pub trait CaptureBackend: Send + Sync {
    /// Asks the user for a display stream.
    ///
    /// # Errors
    /// Returns [`CaptureError::Backend`] when capture is unavailable.
    fn request_display_media(&self) -> Result<(), CaptureError>;

    /// Returns `true` while the granted stream is live.
    fn stream_active(&self) -> bool;

    /// Starts the recorder with the given time slice.
    ///
    /// # Errors
    /// Returns [`CaptureError::Backend`] when the recorder cannot start.
    fn start_recorder(&self, timeslice_ms: u64) -> Result<(), CaptureError>;

    /// Pauses the recorder.
    fn pause_recorder(&self);

    /// Resumes the recorder.
    fn resume_recorder(&self);

    /// Stops the recorder; it flushes a final chunk and reports completion.
    fn stop_recorder(&self);

    /// Stops every stream track.
    fn stop_tracks(&self);
}

/// Backend call recorded by [`SyntheticCaptureBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCall {
    /// [`CaptureBackend::request_display_media`].
    RequestDisplayMedia,
    /// [`CaptureBackend::start_recorder`] with its time slice.
    StartRecorder(u64),
    /// [`CaptureBackend::pause_recorder`].
    PauseRecorder,
    /// [`CaptureBackend::resume_recorder`].
    ResumeRecorder,
    /// [`CaptureBackend::stop_recorder`].
    StopRecorder,
    /// [`CaptureBackend::stop_tracks`].
    StopTracks,
}

#[derive(Debug, Default)]
struct SyntheticState {
    calls: Vec<BackendCall>,
    stream_active: bool,
    unavailable: bool,
}

/// Deterministic synthetic backend for test and CI usage. Clones share state,
/// so a test can keep a handle after moving one into the session.
#[derive(Debug, Clone, Default)]
pub struct SyntheticCaptureBackend {
    state: Arc<Mutex<SyntheticState>>,
}

impl SyntheticCaptureBackend {
    /// Creates a backend whose requests succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose stream requests fail.
    pub fn unavailable() -> Self {
        let backend = Self::default();
        backend.with_state(|state| state.unavailable = true);
        backend
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.with_state(|state| state.calls.clone())
    }

    /// Simulates the user ending the share from the browser UI.
    pub fn end_stream(&self) {
        self.with_state(|state| state.stream_active = false);
    }

    fn record(&self, call: BackendCall) {
        self.with_state(|state| state.calls.push(call));
    }

    fn with_state<T>(&self, apply: impl FnOnce(&mut SyntheticState) -> T) -> T {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut state)
    }
}

impl CaptureBackend for SyntheticCaptureBackend {
    fn request_display_media(&self) -> Result<(), CaptureError> {
        self.record(BackendCall::RequestDisplayMedia);
        self.with_state(|state| {
            if state.unavailable {
                return Err(CaptureError::Backend(
                    "display capture is not supported".to_string(),
                ));
            }
            state.stream_active = true;
            Ok(())
        })
    }

    fn stream_active(&self) -> bool {
        self.with_state(|state| state.stream_active)
    }

    fn start_recorder(&self, timeslice_ms: u64) -> Result<(), CaptureError> {
        self.record(BackendCall::StartRecorder(timeslice_ms));
        Ok(())
    }

    fn pause_recorder(&self) {
        self.record(BackendCall::PauseRecorder);
    }

    fn resume_recorder(&self) {
        self.record(BackendCall::ResumeRecorder);
    }

    fn stop_recorder(&self) {
        self.record(BackendCall::StopRecorder);
    }

    fn stop_tracks(&self) {
        self.record(BackendCall::StopTracks);
        self.with_state(|state| state.stream_active = false);
    }
}

/// Session timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Countdown before recording; `0` records immediately.
    pub countdown_secs: u32,
    /// Recorder time slice.
    pub timeslice_ms: u64,
    /// Runtime kill switch.
    pub capture_enabled: bool,
}

impl SessionConfig {
    /// Extracts session settings from runtime configuration.
    pub fn from_recorder(config: &RecorderConfig) -> Self {
        Self {
            countdown_secs: config.countdown_secs,
            timeslice_ms: config.timeslice_ms,
            capture_enabled: config.capture_enabled,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_recorder(&RecorderConfig::default())
    }
}

/// Observable session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Phase changed.
    PhaseChanged {
        /// Previous phase.
        from: SessionPhase,
        /// New phase.
        to: SessionPhase,
    },
    /// Countdown value now shown.
    CountdownTick(u32),
    /// User dismissed the permission prompt.
    PermissionDenied,
    /// Stream ended during the countdown.
    CountdownAborted,
    /// Asset finalized and waiting for upload.
    AssetReady {
        /// Asset size in bytes.
        bytes: usize,
    },
    /// Upload attempt failed; retry is possible.
    UploadFailed {
        /// Server detail or transport message.
        detail: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Countdown {
    remaining: u32,
    next_tick_at_ms: u64,
}

/// Capture lifecycle state machine with explicit legal transitions.
pub struct CaptureSession {
    backend: Box<dyn CaptureBackend>,
    config: SessionConfig,
    phase: SessionPhase,
    chunks: ChunkBuffer,
    countdown: Option<Countdown>,
    recorder_running: bool,
    started_at_ms: Option<u64>,
    paused_total_ms: u64,
    paused_since_ms: Option<u64>,
    frozen_elapsed_ms: Option<u64>,
    cancelled: bool,
    asset: Option<RecordedAsset>,
    last_error: Option<String>,
    events: VecDeque<SessionEvent>,
}

impl CaptureSession {
    /// Creates an idle session.
    pub fn new(backend: Box<dyn CaptureBackend>, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            phase: SessionPhase::Idle,
            chunks: ChunkBuffer::new(),
            countdown: None,
            recorder_running: false,
            started_at_ms: None,
            paused_total_ms: 0,
            paused_since_ms: None,
            frozen_elapsed_ms: None,
            cancelled: false,
            asset: None,
            last_error: None,
            events: VecDeque::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Remaining countdown value while in [`SessionPhase::Countdown`].
    pub fn countdown_remaining(&self) -> Option<u32> {
        self.countdown.map(|countdown| countdown.remaining)
    }

    /// Returns `true` once [`CaptureSession::discard`] ran.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Chunks accumulated since recording began.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Finalized asset kept for upload and retry.
    pub fn asset(&self) -> Option<&RecordedAsset> {
        self.asset.as_ref()
    }

    /// Detail of the last failed upload.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Recorded time at `now_ms`, excluding paused intervals.
    ///
    /// Never decreases; frozen while paused and after stop.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        if let Some(frozen) = self.frozen_elapsed_ms {
            return frozen;
        }
        let Some(started_at_ms) = self.started_at_ms else {
            return 0;
        };

        let effective_now = self.paused_since_ms.unwrap_or(now_ms).max(started_at_ms);
        effective_now
            .saturating_sub(started_at_ms)
            .saturating_sub(self.paused_total_ms)
    }

    /// Requests a display stream.
    ///
    /// # Errors
    /// Returns [`CaptureError::Disabled`] when the kill switch is off,
    /// [`CaptureError::InvalidPhase`] outside [`SessionPhase::Idle`], and
    /// backend failures after returning to idle.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if !self.config.capture_enabled {
            warn!("capture start blocked by kill switch");
            return Err(CaptureError::Disabled);
        }
        if self.phase != SessionPhase::Idle {
            return Err(CaptureError::InvalidPhase {
                operation: "start",
                phase: self.phase,
            });
        }

        self.transition(SessionPhase::AwaitingPermission);
        if let Err(error) = self.backend.request_display_media() {
            warn!("display stream request failed: {error}");
            self.transition(SessionPhase::Idle);
            return Err(error);
        }
        Ok(())
    }

    /// Stream granted. Starts the countdown, or records immediately when the
    /// countdown is disabled.
    pub fn on_stream_granted(&mut self, now_ms: u64) {
        if self.phase != SessionPhase::AwaitingPermission {
            debug!("late stream grant in {:?}; releasing tracks", self.phase);
            self.backend.stop_tracks();
            return;
        }

        if self.config.countdown_secs == 0 {
            self.begin_recording(now_ms);
            return;
        }

        self.countdown = Some(Countdown {
            remaining: self.config.countdown_secs,
            next_tick_at_ms: now_ms.saturating_add(COUNTDOWN_STEP_MS),
        });
        self.transition(SessionPhase::Countdown);
        self.events
            .push_back(SessionEvent::CountdownTick(self.config.countdown_secs));
    }

    /// User dismissed the permission prompt: silent return to idle.
    pub fn on_stream_rejected(&mut self) {
        if self.phase != SessionPhase::AwaitingPermission {
            return;
        }
        info!("display stream permission denied");
        self.transition(SessionPhase::Idle);
        self.events.push_back(SessionEvent::PermissionDenied);
    }

    /// Advances the countdown.
    pub fn on_tick(&mut self, now_ms: u64) {
        if self.phase != SessionPhase::Countdown {
            return;
        }
        if !self.backend.stream_active() {
            warn!("stream ended during countdown");
            self.countdown = None;
            self.backend.stop_tracks();
            self.transition(SessionPhase::Idle);
            self.events.push_back(SessionEvent::CountdownAborted);
            return;
        }

        while let Some(countdown) = self.countdown {
            if now_ms < countdown.next_tick_at_ms {
                break;
            }
            let remaining = countdown.remaining.saturating_sub(1);
            if remaining == 0 {
                self.countdown = None;
                self.begin_recording(now_ms);
                break;
            }
            self.countdown = Some(Countdown {
                remaining,
                next_tick_at_ms: countdown.next_tick_at_ms.saturating_add(COUNTDOWN_STEP_MS),
            });
            self.events.push_back(SessionEvent::CountdownTick(remaining));
        }
    }

    /// Pauses a recording capture. Returns `false` as a no-op elsewhere.
    pub fn pause(&mut self, now_ms: u64) -> bool {
        if self.phase != SessionPhase::Recording {
            return false;
        }
        self.backend.pause_recorder();
        self.paused_since_ms = Some(now_ms);
        self.transition(SessionPhase::Paused);
        true
    }

    /// Resumes a paused capture, excluding the paused interval from elapsed
    /// time. Returns `false` as a no-op elsewhere.
    pub fn resume(&mut self, now_ms: u64) -> bool {
        if self.phase != SessionPhase::Paused {
            return false;
        }
        if let Some(since) = self.paused_since_ms.take() {
            self.paused_total_ms = self
                .paused_total_ms
                .saturating_add(now_ms.saturating_sub(since));
        }
        self.backend.resume_recorder();
        self.transition(SessionPhase::Recording);
        true
    }

    /// Stops the capture and waits for the recorder to flush. Returns `false`
    /// as a no-op outside recording/paused.
    pub fn stop(&mut self, now_ms: u64) -> bool {
        if !self.phase.is_capturing() {
            return false;
        }
        self.frozen_elapsed_ms = Some(self.elapsed_ms(now_ms));
        self.halt_platform();
        self.transition(SessionPhase::Stopping);
        true
    }

    /// Browser-side "stop sharing"; same as [`CaptureSession::stop`].
    pub fn on_track_ended(&mut self, now_ms: u64) -> bool {
        self.stop(now_ms)
    }

    /// Appends one recorder chunk. Empty chunks and chunks arriving outside
    /// an active recording are dropped.
    pub fn on_chunk(&mut self, chunk: MediaChunk) -> bool {
        let accepting = matches!(
            self.phase,
            SessionPhase::Recording | SessionPhase::Paused | SessionPhase::Stopping
        );
        if !accepting || self.cancelled {
            return false;
        }
        self.chunks.push_chunk(chunk)
    }

    /// Recorder flushed. Finalizes the asset and moves to uploading, unless
    /// the session was discarded in the meantime.
    pub fn on_recorder_stopped(&mut self) {
        if self.cancelled {
            debug!("recorder stopped after discard; nothing to upload");
            self.chunks.clear();
            return;
        }
        if self.phase != SessionPhase::Stopping {
            return;
        }

        let duration_ms = self.frozen_elapsed_ms.unwrap_or(0);
        let asset = self.chunks.finalize(duration_ms);
        info!(
            "capture finalized: {} chunks, {} bytes, {} ms",
            asset.chunk_count,
            asset.bytes.len(),
            asset.duration_ms
        );
        self.events.push_back(SessionEvent::AssetReady {
            bytes: asset.bytes.len(),
        });
        self.asset = Some(asset);
        self.transition(SessionPhase::Uploading);
    }

    /// Returns the asset to upload, re-checking the cancellation flag at the
    /// point of upload.
    pub fn begin_upload(&self) -> Option<&RecordedAsset> {
        if self.cancelled || self.phase != SessionPhase::Uploading {
            return None;
        }
        self.asset.as_ref()
    }

    /// Applies the upload outcome. `Err` carries the status detail shown to
    /// the user. Ignored after a discard.
    pub fn complete_upload(&mut self, outcome: Result<(), String>) {
        if self.cancelled || self.phase != SessionPhase::Uploading {
            return;
        }

        match outcome {
            Ok(()) => {
                self.asset = None;
                self.last_error = None;
                self.transition(SessionPhase::Done);
            }
            Err(detail) => {
                self.last_error = Some(detail.clone());
                self.transition(SessionPhase::Error);
                self.events.push_back(SessionEvent::UploadFailed { detail });
            }
        }
    }

    /// Re-enters uploading with the retained asset. Returns `false` unless a
    /// failed upload is pending.
    pub fn retry_upload(&mut self) -> bool {
        if self.phase != SessionPhase::Error || self.asset.is_none() {
            return false;
        }
        self.last_error = None;
        self.transition(SessionPhase::Uploading);
        true
    }

    /// Abandons the session from any non-terminal phase. Stops recorder and
    /// stream immediately and suppresses any later upload.
    pub fn discard(&mut self) -> bool {
        if self.phase.is_terminal() {
            return false;
        }

        self.cancelled = true;
        self.countdown = None;
        if matches!(
            self.phase,
            SessionPhase::AwaitingPermission
                | SessionPhase::Countdown
                | SessionPhase::Recording
                | SessionPhase::Paused
        ) {
            self.halt_platform();
        }
        self.chunks.clear();
        self.asset = None;
        self.transition(SessionPhase::Cancelled);
        info!("capture discarded");
        true
    }

    /// Removes and returns queued events in emission order.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    fn begin_recording(&mut self, now_ms: u64) {
        if let Err(error) = self.backend.start_recorder(self.config.timeslice_ms) {
            warn!("recorder failed to start: {error}");
            self.backend.stop_tracks();
            self.transition(SessionPhase::Idle);
            return;
        }
        self.recorder_running = true;
        self.started_at_ms = Some(now_ms);
        self.paused_total_ms = 0;
        self.paused_since_ms = None;
        self.frozen_elapsed_ms = None;
        self.transition(SessionPhase::Recording);
    }

    fn halt_platform(&mut self) {
        if self.recorder_running {
            self.backend.stop_recorder();
            self.recorder_running = false;
        }
        self.backend.stop_tracks();
    }

    fn transition(&mut self, to: SessionPhase) {
        let from = self.phase;
        if from == to {
            return;
        }
        self.phase = to;
        info!("capture phase {from:?} -> {to:?}");
        self.events.push_back(SessionEvent::PhaseChanged { from, to });
    }
}

/// Capture layer error type.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Kill switch blocks new captures.
    #[error("capture is disabled by configuration")]
    Disabled,
    /// Operation not legal in the current phase.
    #[error("cannot {operation} while {phase:?}")]
    InvalidPhase {
        /// Rejected operation.
        operation: &'static str,
        /// Phase at the time of the call.
        phase: SessionPhase,
    },
    /// Backend runtime failure.
    #[error("capture backend failure: {0}")]
    Backend(String),
}
