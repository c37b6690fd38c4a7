#![warn(missing_docs)]
//! # screen-veil-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `screen-veil` workspace.
//!
//! ## Responsibilities
//! - Represent capture lifecycle phases, mask tools, and privacy settings.
//! - Buffer recorder chunks in arrival order and finalize them into one asset.
//! - Model the inter-process messages that trigger and steer an injection.
//! - Hold runtime timing configuration with environment overrides.
//!
//! ## Data flow
//! The platform recorder emits [`MediaChunk`] values into a [`ChunkBuffer`].
//! On stop the buffer is finalized into a [`RecordedAsset`], which the upload
//! layer packages together with [`UploadMetadata`].
//!
//! ## Ownership and lifetimes
//! Chunks and assets own their byte buffers (`Vec<u8>`), so a finalized asset
//! can be kept for upload retries after the recorder has been dropped.
//!
//! ## Error model
//! Validation failures (blank titles, zero intervals, malformed messages)
//! return [`CoreError`] variants.
//!
//! ## Security and privacy notes
//! Recorded bytes are never logged; only sizes and counts are.
//!
//! ## Example
//! ```rust
//! use screen_veil_core::{ChunkBuffer, MediaChunk};
//!
//! let mut buffer = ChunkBuffer::new();
//! buffer.push_chunk(MediaChunk::new(0, vec![1, 2]));
//! buffer.push_chunk(MediaChunk::new(1, vec![3]));
//! let asset = buffer.finalize(2_000);
//! assert_eq!(asset.bytes, vec![1, 2, 3]);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// MIME type of finalized recordings.
pub const RECORDING_MIME_TYPE: &str = "video/webm";

/// Default upload endpoint used when no override is configured.
pub const DEFAULT_UPLOAD_ENDPOINT: &str = "http://localhost:8000/api/v1/upload";

/// Blur radius used when none is configured.
pub const DEFAULT_BLUR_INTENSITY_PX: u32 = 6;
/// Largest accepted blur radius.
pub const MAX_BLUR_INTENSITY_PX: u32 = 20;

/// Lifecycle phase of the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing is being captured.
    Idle,
    /// Waiting for the user to grant a display stream.
    AwaitingPermission,
    /// Stream granted; visible countdown before recording begins.
    Countdown,
    /// Recorder running.
    Recording,
    /// Recorder paused; elapsed time frozen.
    Paused,
    /// Stop requested; waiting for the recorder to flush.
    Stopping,
    /// Asset finalized and handed to the upload collaborator.
    Uploading,
    /// Upload succeeded.
    Done,
    /// Upload failed; retry is possible without re-recording.
    Error,
    /// Discarded by the user.
    Cancelled,
}

impl SessionPhase {
    /// Returns `true` for phases no transition leaves except a new session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// Returns `true` while the recorder holds captured media that would be
    /// lost on unload.
    pub fn is_capturing(self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

/// Visual strategy chosen in the widget's tool selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskTool {
    /// Solid redaction block.
    #[default]
    Mask,
    /// Strong blur.
    Blur,
}

/// Fill drawn by the mask tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskStyle {
    /// Opaque black block.
    Solid,
    /// Light dotted pattern.
    #[default]
    Dots,
}

impl std::str::FromStr for MaskStyle {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "solid" => Ok(Self::Solid),
            "dots" => Ok(Self::Dots),
            other => Err(CoreError::InvalidConfig(format!("unknown mask style: {other:?}"))),
        }
    }
}

/// How the blur and mask classes render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskAppearance {
    /// Blur radius of the blur tool, in CSS pixels.
    pub blur_intensity_px: u32,
    /// Fill of the mask tool.
    pub mask_style: MaskStyle,
}

impl Default for MaskAppearance {
    fn default() -> Self {
        Self {
            blur_intensity_px: DEFAULT_BLUR_INTENSITY_PX,
            mask_style: MaskStyle::default(),
        }
    }
}

/// Concrete visual operation applied to one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskKind {
    /// Editable text input rendered as a password field.
    Secretize,
    /// Any other element covered by the tool's obscuring class.
    Obscure(MaskTool),
}

/// Privacy settings for one activation. Only the rule set outlives it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyConfig {
    /// Whether click-to-mask editing is active.
    pub enabled: bool,
    /// Tool used for newly created rules.
    pub active_tool: MaskTool,
}

/// One time-sliced piece of recorded media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaChunk {
    /// Recorder-assigned sequence number.
    pub sequence: u64,
    /// Encoded media bytes.
    pub bytes: Vec<u8>,
}

impl MediaChunk {
    /// Creates a chunk.
    pub fn new(sequence: u64, bytes: Vec<u8>) -> Self {
        Self { sequence, bytes }
    }
}

/// Append-only chunk accumulator.
#[derive(Debug, Clone, Default)]
pub struct ChunkBuffer {
    chunks: Vec<MediaChunk>,
}

impl ChunkBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one chunk in arrival order.
    ///
    /// Empty chunks are dropped; the recorder emits them on idle slices.
    /// Returns `true` when the chunk was kept.
    pub fn push_chunk(&mut self, chunk: MediaChunk) -> bool {
        if chunk.bytes.is_empty() {
            return false;
        }
        self.chunks.push(chunk);
        true
    }

    /// Returns buffered chunk count.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns `true` when nothing has been buffered.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Returns total buffered byte count.
    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.bytes.len()).sum()
    }

    /// Drops every buffered chunk.
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Concatenates buffered chunks into one asset and resets the buffer.
    pub fn finalize(&mut self, duration_ms: u64) -> RecordedAsset {
        let chunks = std::mem::take(&mut self.chunks);
        let chunk_count = chunks.len();
        let mut bytes = Vec::with_capacity(chunks.iter().map(|chunk| chunk.bytes.len()).sum());
        for chunk in chunks {
            bytes.extend_from_slice(&chunk.bytes);
        }

        RecordedAsset {
            mime_type: RECORDING_MIME_TYPE.to_string(),
            bytes,
            chunk_count,
            duration_ms,
        }
    }
}

/// Finalized recording kept in memory until upload succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAsset {
    /// Container MIME type.
    pub mime_type: String,
    /// Concatenated chunk bytes.
    pub bytes: Vec<u8>,
    /// Number of chunks that made up the asset.
    pub chunk_count: usize,
    /// Recorded duration excluding paused time.
    pub duration_ms: u64,
}

/// Session metadata sent alongside the asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    /// Display title of the tutorial.
    pub title: String,
    /// Target module identifier, opaque to the core.
    pub module_id: String,
}

impl UploadMetadata {
    /// Creates validated metadata.
    ///
    /// # Errors
    /// Returns [`CoreError::BlankField`] when the module id is blank.
    pub fn new(title: impl Into<String>, module_id: impl Into<String>) -> Result<Self, CoreError> {
        let module_id = module_id.into();
        if module_id.trim().is_empty() {
            return Err(CoreError::BlankField("module_id"));
        }
        Ok(Self {
            title: title.into(),
            module_id,
        })
    }
}

/// Messages delivered to the in-page core by the extension shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum InboundMessage {
    /// Bootstraps the recorder on the page.
    #[serde(rename = "INIT_RECORDER", rename_all = "camelCase")]
    InitRecorder {
        /// Tutorial title.
        title: String,
        /// Target module id; numeric ids are accepted and stringified.
        #[serde(deserialize_with = "module_id_from_any")]
        module_id: String,
        /// Whether privacy editing starts enabled.
        #[serde(default)]
        is_privacy_mode: bool,
    },
    /// Flips privacy editing after injection.
    #[serde(rename = "TOGGLE_PRIVACY_MODE")]
    TogglePrivacyMode {
        /// Requested editing state.
        active: bool,
    },
}

impl InboundMessage {
    /// Parses one raw JSON message.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] for unknown actions or malformed fields.
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw).map_err(CoreError::Codec)
    }
}

fn module_id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// Readiness acknowledgement returned for [`InboundMessage::InitRecorder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyAck {
    /// Always `"ok"`.
    pub status: String,
    /// Build version of the injected core.
    pub version: String,
}

impl ReadyAck {
    /// Creates an `ok` acknowledgement.
    pub fn ok(version: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            version: version.into(),
        }
    }
}

/// Timing and endpoint configuration for one injection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Visible countdown before recording starts; `0` starts immediately.
    pub countdown_secs: u32,
    /// Recorder time slice.
    pub timeslice_ms: u64,
    /// Modifier hold duration that engages smart pause.
    pub hold_delay_ms: u64,
    /// Countdown shown by the deliberate resume path.
    pub resume_countdown_secs: u32,
    /// Delay between upload success and widget teardown.
    pub teardown_delay_ms: u64,
    /// Widget timer refresh cadence.
    pub timer_refresh_ms: u64,
    /// Lifetime of a click ripple marker.
    pub ripple_ms: u64,
    /// Modifier key name as reported by keyboard events.
    pub modifier_key: String,
    /// Upload endpoint URL.
    pub upload_endpoint: String,
    /// Runtime kill switch; `false` blocks new captures.
    pub capture_enabled: bool,
    /// Blur radius of the blur tool, `1..=20` pixels.
    pub blur_intensity_px: u32,
    /// Fill of the mask tool.
    pub mask_style: MaskStyle,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            timeslice_ms: 1_000,
            hold_delay_ms: 300,
            resume_countdown_secs: 3,
            teardown_delay_ms: 3_000,
            timer_refresh_ms: 1_000,
            ripple_ms: 600,
            modifier_key: "Alt".to_string(),
            upload_endpoint: DEFAULT_UPLOAD_ENDPOINT.to_string(),
            capture_enabled: true,
            blur_intensity_px: DEFAULT_BLUR_INTENSITY_PX,
            mask_style: MaskStyle::default(),
        }
    }
}

impl RecorderConfig {
    /// Builds configuration from process environment variables.
    ///
    /// # Errors
    /// See [`RecorderConfig::from_lookup`].
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from defaults overlaid with `SCREEN_VEIL_*` values
    /// returned by `lookup`.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidConfig`] for unparsable numbers, zero
    /// intervals, an out-of-range blur, an unknown mask style, or a
    /// non-http(s) upload endpoint.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("SCREEN_VEIL_COUNTDOWN_SECS") {
            config.countdown_secs = parse_number("SCREEN_VEIL_COUNTDOWN_SECS", &raw)?;
        }
        if let Some(raw) = lookup("SCREEN_VEIL_TIMESLICE_MS") {
            config.timeslice_ms = parse_number("SCREEN_VEIL_TIMESLICE_MS", &raw)?;
        }
        if let Some(raw) = lookup("SCREEN_VEIL_HOLD_DELAY_MS") {
            config.hold_delay_ms = parse_number("SCREEN_VEIL_HOLD_DELAY_MS", &raw)?;
        }
        if let Some(raw) = lookup("SCREEN_VEIL_RESUME_COUNTDOWN_SECS") {
            config.resume_countdown_secs = parse_number("SCREEN_VEIL_RESUME_COUNTDOWN_SECS", &raw)?;
        }
        if let Some(raw) = lookup("SCREEN_VEIL_TEARDOWN_DELAY_MS") {
            config.teardown_delay_ms = parse_number("SCREEN_VEIL_TEARDOWN_DELAY_MS", &raw)?;
        }
        if let Some(raw) = lookup("SCREEN_VEIL_MODIFIER_KEY") {
            config.modifier_key = raw.trim().to_string();
        }
        if let Some(raw) = lookup("SCREEN_VEIL_UPLOAD_ENDPOINT") {
            config.upload_endpoint = raw.trim().to_string();
        }
        if let Some(raw) = lookup("SCREEN_VEIL_CAPTURE_ENABLED") {
            let normalized = raw.trim().to_ascii_lowercase();
            config.capture_enabled = !(normalized == "0" || normalized == "false" || normalized == "off");
        }
        if let Some(raw) = lookup("SCREEN_VEIL_BLUR_INTENSITY_PX") {
            config.blur_intensity_px = parse_number("SCREEN_VEIL_BLUR_INTENSITY_PX", &raw)?;
        }
        if let Some(raw) = lookup("SCREEN_VEIL_MASK_STYLE") {
            config.mask_style = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Mask rendering settings.
    pub fn mask_appearance(&self) -> MaskAppearance {
        MaskAppearance {
            blur_intensity_px: self.blur_intensity_px,
            mask_style: self.mask_style,
        }
    }

    /// Checks interval, blur, and endpoint constraints.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidConfig`] describing the first violation.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.timeslice_ms == 0 {
            return Err(CoreError::InvalidConfig("timeslice_ms must be greater than zero".to_string()));
        }
        if self.timer_refresh_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "timer_refresh_ms must be greater than zero".to_string(),
            ));
        }
        if self.modifier_key.is_empty() {
            return Err(CoreError::InvalidConfig("modifier_key is empty".to_string()));
        }
        if !(1..=MAX_BLUR_INTENSITY_PX).contains(&self.blur_intensity_px) {
            return Err(CoreError::InvalidConfig(format!(
                "blur_intensity_px must be within 1..={MAX_BLUR_INTENSITY_PX}, got {}",
                self.blur_intensity_px
            )));
        }

        let endpoint = Url::parse(&self.upload_endpoint)
            .map_err(|error| CoreError::InvalidConfig(format!("invalid upload endpoint: {error}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(CoreError::InvalidConfig(
                "upload endpoint must use http or https".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::InvalidConfig(format!("{key} is not a valid number: {raw:?}")))
}

/// Error type for core validation and codec failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required text field was blank.
    #[error("{0} must not be blank")]
    BlankField(&'static str),
    /// Configuration value out of range or unparsable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// JSON encoding/decoding error.
    #[error("message codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}
