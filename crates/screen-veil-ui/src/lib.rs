#![warn(missing_docs)]
//! # screen-veil-ui
//!
//! ## Purpose
//! Defines the floating control widget: the on-page surface that issues
//! commands and reflects capture, privacy, and smart-pause state.
//!
//! ## Responsibilities
//! - Track minimized/expanded presentation (pure view state).
//! - Refresh the `mm:ss` timer at a fixed cadence while not paused.
//! - Expose which [`Command`]s are available in each phase.
//! - Render markup and a `:host`-scoped stylesheet for an isolated shadow root.
//!
//! ## Data flow
//! Session manager events mutate [`FloatingControlWidget`]; user clicks map
//! to [`Command`] values handled by the session manager.
//!
//! ## Ownership and lifetimes
//! The widget owns all display strings so re-rendering never borrows from
//! the session.
//!
//! ## Error model
//! This crate favors explicit state over recoverable errors. Unavailable
//! commands are filtered by [`FloatingControlWidget::accepts`].
//!
//! ## Security and privacy notes
//! Page-provided text (title, server detail) is HTML-escaped before render.

use screen_veil_core::{MaskTool, PrivacyConfig, RecorderConfig, SessionPhase};

/// Neutral status shown after the permission prompt is dismissed.
pub const CANCELLED_STATUS: &str = "Recording cancelled";
/// Status while the upload is in flight.
pub const UPLOADING_STATUS: &str = "Uploading...";
/// Status after a successful upload.
pub const UPLOADED_STATUS: &str = "Upload complete";

const WIDGET_STYLESHEET: &str = "\
:host { all: initial; position: fixed; bottom: 16px; left: 16px; z-index: 2147483647; font-family: system-ui, sans-serif; }
.widget { display: flex; flex-direction: column; gap: 8px; padding: 10px 12px; border-radius: 12px; background: rgba(15, 23, 42, 0.92); color: #fff; box-shadow: 0 10px 30px rgba(0, 0, 0, 0.35); }
.widget.minimized { width: 44px; height: 44px; padding: 0; border-radius: 50%; align-items: center; justify-content: center; }
.widget.minimized .panel { display: none; }
.timer { font-family: ui-monospace, monospace; font-size: 14px; }
.status { font-size: 12px; color: #cbd5e1; }
.status.error { color: #fca5a5; }
.controls { display: flex; gap: 6px; }
.controls button { border: none; border-radius: 6px; padding: 4px 8px; cursor: pointer; }
.controls button.active { background: #0d9488; color: #fff; }
.countdown-overlay, .smart-pause { position: fixed; inset: 0; display: flex; align-items: center; justify-content: center; font-size: 96px; color: #fff; background: rgba(15, 23, 42, 0.4); }
.ripple { position: fixed; width: 24px; height: 24px; margin: -12px 0 0 -12px; border-radius: 50%; border: 2px solid #facc15; pointer-events: none; }
";

/// Widget size state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Compact dot.
    Minimized,
    /// Full control panel.
    Expanded,
}

/// User action issued from the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin a capture.
    Start,
    /// Pause the recorder.
    Pause,
    /// Resume the recorder.
    Resume,
    /// Stop and upload.
    Stop,
    /// Abandon the capture.
    Discard,
    /// Upload the retained asset again.
    Retry,
    /// Discard any active capture and dispose the tool.
    Close,
    /// Flip privacy editing.
    TogglePrivacy,
    /// Choose the tool for new rules.
    SelectTool(MaskTool),
    /// Remove every mask rule.
    ClearMasks,
    /// Deliberate resume from smart pause.
    SmartResume,
    /// Collapse to the dot.
    Minimize,
    /// Open the panel.
    Expand,
}

impl Command {
    /// Stable name used in `data-command` attributes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Discard => "discard",
            Self::Retry => "retry",
            Self::Close => "close",
            Self::TogglePrivacy => "toggle-privacy",
            Self::SelectTool(MaskTool::Mask) => "tool-mask",
            Self::SelectTool(MaskTool::Blur) => "tool-blur",
            Self::ClearMasks => "clear-masks",
            Self::SmartResume => "smart-resume",
            Self::Minimize => "minimize",
            Self::Expand => "expand",
        }
    }

    /// Parses a `data-command` attribute value.
    pub fn parse(name: &str) -> Option<Self> {
        let command = match name {
            "start" => Self::Start,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "stop" => Self::Stop,
            "discard" => Self::Discard,
            "retry" => Self::Retry,
            "close" => Self::Close,
            "toggle-privacy" => Self::TogglePrivacy,
            "tool-mask" => Self::SelectTool(MaskTool::Mask),
            "tool-blur" => Self::SelectTool(MaskTool::Blur),
            "clear-masks" => Self::ClearMasks,
            "smart-resume" => Self::SmartResume,
            "minimize" => Self::Minimize,
            "expand" => Self::Expand,
            _ => return None,
        };
        Some(command)
    }
}

/// Transient click marker drawn during recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ripple {
    /// Viewport x coordinate.
    pub x: i32,
    /// Viewport y coordinate.
    pub y: i32,
    /// Removal instant.
    pub expires_at_ms: u64,
}

/// Floating control widget state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingControlWidget {
    title: String,
    version: String,
    presentation: Presentation,
    phase: SessionPhase,
    displayed_elapsed_ms: u64,
    next_refresh_at_ms: Option<u64>,
    refresh_ms: u64,
    countdown: Option<u32>,
    privacy: PrivacyConfig,
    status: Option<String>,
    retry_enabled: bool,
    smart_paused: bool,
    resume_countdown: Option<u32>,
    ripples: Vec<Ripple>,
    ripple_ms: u64,
}

impl FloatingControlWidget {
    /// Creates an expanded, idle widget.
    pub fn new(title: impl Into<String>, version: impl Into<String>, config: &RecorderConfig) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
            presentation: Presentation::Expanded,
            phase: SessionPhase::Idle,
            displayed_elapsed_ms: 0,
            next_refresh_at_ms: None,
            refresh_ms: config.timer_refresh_ms.max(1),
            countdown: None,
            privacy: PrivacyConfig::default(),
            status: None,
            retry_enabled: false,
            smart_paused: false,
            resume_countdown: None,
            ripples: Vec::new(),
            ripple_ms: config.ripple_ms,
        }
    }

    /// Current presentation.
    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    /// Collapses to the dot.
    pub fn minimize(&mut self) {
        self.presentation = Presentation::Minimized;
    }

    /// Opens the panel.
    pub fn expand(&mut self) {
        self.presentation = Presentation::Expanded;
    }

    /// Phase shown by the widget.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Status line text.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Returns `true` while the retry control is enabled.
    pub fn retry_enabled(&self) -> bool {
        self.retry_enabled
    }

    /// Privacy settings shown by the toggle and tool selector.
    pub fn privacy(&self) -> PrivacyConfig {
        self.privacy
    }

    /// Countdown value shown in the overlay.
    pub fn countdown(&self) -> Option<u32> {
        self.countdown
    }

    /// Returns `true` while the smart-pause overlay is shown.
    pub fn smart_paused(&self) -> bool {
        self.smart_paused
    }

    /// Resume countdown value shown in the smart-pause overlay.
    pub fn resume_countdown(&self) -> Option<u32> {
        self.resume_countdown
    }

    /// Live click markers.
    pub fn ripples(&self) -> &[Ripple] {
        &self.ripples
    }

    /// Timer text, `mm:ss`.
    pub fn timer_text(&self) -> String {
        format_elapsed(self.displayed_elapsed_ms)
    }

    /// Reflects a session phase change.
    ///
    /// `elapsed_ms` is the session's elapsed time at `now_ms`; the timer is
    /// synced to it immediately.
    pub fn on_phase(&mut self, phase: SessionPhase, now_ms: u64, elapsed_ms: u64) {
        self.phase = phase;
        self.displayed_elapsed_ms = elapsed_ms;
        self.next_refresh_at_ms = match phase {
            SessionPhase::Recording => Some(now_ms.saturating_add(self.refresh_ms)),
            _ => None,
        };

        match phase {
            SessionPhase::Countdown => {
                self.minimize();
                self.status = None;
            }
            SessionPhase::Recording => self.status = None,
            SessionPhase::Uploading => {
                self.expand();
                self.retry_enabled = false;
                self.status = Some(UPLOADING_STATUS.to_string());
            }
            SessionPhase::Done => {
                self.retry_enabled = false;
                self.status = Some(UPLOADED_STATUS.to_string());
            }
            SessionPhase::Idle | SessionPhase::Cancelled => {
                self.countdown = None;
                self.ripples.clear();
            }
            SessionPhase::AwaitingPermission
            | SessionPhase::Paused
            | SessionPhase::Stopping
            | SessionPhase::Error => {}
        }
        if phase != SessionPhase::Countdown {
            self.countdown = None;
        }
    }

    /// Shows a countdown value.
    pub fn set_countdown(&mut self, value: u32) {
        self.countdown = Some(value);
    }

    /// Shows the neutral cancellation status.
    pub fn on_permission_denied(&mut self) {
        self.status = Some(CANCELLED_STATUS.to_string());
    }

    /// Shows an upload failure and enables retry.
    pub fn on_upload_failed(&mut self, status: impl Into<String>) {
        self.expand();
        self.status = Some(status.into());
        self.retry_enabled = true;
    }

    /// Reflects privacy settings.
    pub fn set_privacy(&mut self, privacy: PrivacyConfig) {
        self.privacy = privacy;
    }

    /// Shows or hides the smart-pause overlay. Leaving smart pause collapses
    /// the widget.
    pub fn on_smart_pause(&mut self, paused: bool, now_ms: u64, elapsed_ms: u64) {
        self.smart_paused = paused;
        self.displayed_elapsed_ms = elapsed_ms;
        if paused {
            self.next_refresh_at_ms = None;
        } else {
            self.resume_countdown = None;
            self.minimize();
            if self.phase == SessionPhase::Recording {
                self.next_refresh_at_ms = Some(now_ms.saturating_add(self.refresh_ms));
            }
        }
    }

    /// Shows a resume countdown value.
    pub fn set_resume_countdown(&mut self, value: u32) {
        self.resume_countdown = Some(value);
    }

    /// Adds a click marker at `(x, y)`.
    pub fn add_ripple(&mut self, x: i32, y: i32, now_ms: u64) {
        self.ripples.push(Ripple {
            x,
            y,
            expires_at_ms: now_ms.saturating_add(self.ripple_ms),
        });
    }

    /// Advances timers. Returns `true` when the rendered output changed.
    pub fn tick(&mut self, now_ms: u64, elapsed_ms: u64) -> bool {
        let before = self.ripples.len();
        self.ripples.retain(|ripple| ripple.expires_at_ms > now_ms);
        let mut changed = self.ripples.len() != before;

        if let Some(due) = self.next_refresh_at_ms
            && now_ms >= due
            && !self.smart_paused
        {
            self.displayed_elapsed_ms = elapsed_ms;
            let mut next = due;
            while next <= now_ms {
                next = next.saturating_add(self.refresh_ms);
            }
            self.next_refresh_at_ms = Some(next);
            changed = true;
        }
        changed
    }

    /// Commands currently offered, in display order.
    pub fn visible_commands(&self) -> Vec<Command> {
        if self.smart_paused {
            return if self.resume_countdown.is_some() {
                Vec::new()
            } else {
                vec![Command::SmartResume, Command::Stop]
            };
        }

        let privacy = [
            Command::TogglePrivacy,
            Command::SelectTool(MaskTool::Mask),
            Command::SelectTool(MaskTool::Blur),
        ];
        let mut commands = match self.phase {
            SessionPhase::Idle => {
                let mut commands = vec![Command::Start];
                commands.extend(privacy);
                commands.push(Command::ClearMasks);
                commands.push(Command::Close);
                commands
            }
            SessionPhase::AwaitingPermission | SessionPhase::Countdown => vec![Command::Close],
            SessionPhase::Recording => {
                let mut commands = vec![Command::Pause, Command::Stop, Command::Discard];
                commands.extend(privacy);
                commands
            }
            SessionPhase::Paused => {
                let mut commands = vec![Command::Resume, Command::Stop, Command::Discard];
                commands.extend(privacy);
                commands
            }
            SessionPhase::Stopping | SessionPhase::Uploading => vec![Command::Close],
            SessionPhase::Error => {
                let mut commands = Vec::new();
                if self.retry_enabled {
                    commands.push(Command::Retry);
                }
                commands.push(Command::Close);
                commands
            }
            SessionPhase::Done | SessionPhase::Cancelled => Vec::new(),
        };

        if !self.phase.is_terminal() {
            commands.push(match self.presentation {
                Presentation::Expanded => Command::Minimize,
                Presentation::Minimized => Command::Expand,
            });
        }
        commands
    }

    /// Returns `true` when `command` is currently offered.
    pub fn accepts(&self, command: Command) -> bool {
        self.visible_commands().contains(&command)
    }

    /// Renders `(stylesheet, markup)` for the isolated shadow root.
    pub fn render(&self) -> (String, String) {
        let mut markup = String::new();
        let presentation = match self.presentation {
            Presentation::Expanded => "expanded",
            Presentation::Minimized => "minimized",
        };
        markup.push_str(&format!(
            "<div class=\"widget {presentation}\" data-phase=\"{}\" data-version=\"{}\">",
            phase_name(self.phase),
            escape_html(&self.version)
        ));
        markup.push_str(&format!("<span class=\"timer\">{}</span>", self.timer_text()));
        markup.push_str("<div class=\"panel\">");
        markup.push_str(&format!("<p class=\"title\">{}</p>", escape_html(&self.title)));
        if let Some(status) = &self.status {
            let class = if self.phase == SessionPhase::Error {
                "status error"
            } else {
                "status"
            };
            markup.push_str(&format!("<p class=\"{class}\">{}</p>", escape_html(status)));
        }

        markup.push_str("<div class=\"controls\">");
        for command in self.visible_commands() {
            let active = match command {
                Command::TogglePrivacy => self.privacy.enabled,
                Command::SelectTool(tool) => self.privacy.active_tool == tool,
                _ => false,
            };
            markup.push_str(&format!(
                "<button data-command=\"{}\"{}>{}</button>",
                command.as_str(),
                if active { " class=\"active\"" } else { "" },
                command_label(command)
            ));
        }
        markup.push_str("</div></div></div>");

        if let Some(value) = self.countdown {
            markup.push_str(&format!("<div class=\"countdown-overlay\">{value}</div>"));
        }
        if self.smart_paused {
            let text = match self.resume_countdown {
                Some(value) => format!("Resuming in {value}"),
                None => "Paused (smart pause)".to_string(),
            };
            markup.push_str(&format!("<div class=\"smart-pause\">{text}</div>"));
        }
        for ripple in &self.ripples {
            markup.push_str(&format!(
                "<div class=\"ripple\" style=\"left: {}px; top: {}px\"></div>",
                ripple.x, ripple.y
            ));
        }

        (WIDGET_STYLESHEET.to_string(), markup)
    }
}

/// Formats milliseconds as zero-padded `mm:ss`. Minutes keep growing past 59.
pub fn format_elapsed(elapsed_ms: u64) -> String {
    let total_secs = elapsed_ms / 1_000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Escapes text for HTML content and attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn phase_name(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Idle => "idle",
        SessionPhase::AwaitingPermission => "awaiting_permission",
        SessionPhase::Countdown => "countdown",
        SessionPhase::Recording => "recording",
        SessionPhase::Paused => "paused",
        SessionPhase::Stopping => "stopping",
        SessionPhase::Uploading => "uploading",
        SessionPhase::Done => "done",
        SessionPhase::Error => "error",
        SessionPhase::Cancelled => "cancelled",
    }
}

fn command_label(command: Command) -> &'static str {
    match command {
        Command::Start => "Record",
        Command::Pause => "Pause",
        Command::Resume => "Resume",
        Command::Stop => "Stop",
        Command::Discard => "Discard",
        Command::Retry => "Retry",
        Command::Close => "Close",
        Command::TogglePrivacy => "Privacy",
        Command::SelectTool(MaskTool::Mask) => "Mask",
        Command::SelectTool(MaskTool::Blur) => "Blur",
        Command::ClearMasks => "Clear masks",
        Command::SmartResume => "Resume",
        Command::Minimize => "Minimize",
        Command::Expand => "Expand",
    }
}
