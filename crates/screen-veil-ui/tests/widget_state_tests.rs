//! Integration tests for the floating control widget.

use screen_veil_core::{MaskTool, PrivacyConfig, RecorderConfig, SessionPhase};
use screen_veil_ui::{
    CANCELLED_STATUS, Command, FloatingControlWidget, Presentation, UPLOADED_STATUS,
    UPLOADING_STATUS,
};

fn widget() -> FloatingControlWidget {
    FloatingControlWidget::new("Cancel an invoice", "0.1.0", &RecorderConfig::default())
}

#[test]
fn widget_state_tests_timer_refreshes_at_one_hertz_while_recording() {
    let mut widget = widget();
    widget.on_phase(SessionPhase::Recording, 0, 0);

    assert!(!widget.tick(999, 999));
    assert_eq!(widget.timer_text(), "00:00");
    assert!(widget.tick(1_000, 1_000));
    assert_eq!(widget.timer_text(), "00:01");
    assert!(widget.tick(12_400, 12_400));
    assert_eq!(widget.timer_text(), "00:12");
}

#[test]
fn widget_state_tests_timer_holds_while_paused() {
    let mut widget = widget();
    widget.on_phase(SessionPhase::Recording, 0, 0);
    widget.tick(12_000, 12_000);
    widget.on_phase(SessionPhase::Paused, 12_000, 12_000);

    assert!(!widget.tick(15_000, 12_000));
    assert_eq!(widget.timer_text(), "00:12");

    widget.on_phase(SessionPhase::Recording, 17_000, 12_000);
    assert!(widget.tick(18_000, 13_000));
    assert_eq!(widget.timer_text(), "00:13");
}

#[test]
fn widget_state_tests_countdown_minimizes_and_smart_resume_collapses() {
    let mut widget = widget();
    assert_eq!(widget.presentation(), Presentation::Expanded);

    widget.on_phase(SessionPhase::Countdown, 0, 0);
    widget.set_countdown(3);
    assert_eq!(widget.presentation(), Presentation::Minimized);
    assert_eq!(widget.countdown(), Some(3));

    widget.on_phase(SessionPhase::Recording, 3_000, 0);
    assert_eq!(widget.countdown(), None);
    widget.expand();

    widget.on_smart_pause(true, 5_000, 2_000);
    assert_eq!(
        widget.visible_commands(),
        vec![Command::SmartResume, Command::Stop]
    );
    assert!(!widget.accepts(Command::Discard));
    widget.set_resume_countdown(3);
    assert!(widget.visible_commands().is_empty());
    assert!(!widget.accepts(Command::Stop));

    widget.on_smart_pause(false, 8_000, 2_000);
    assert_eq!(widget.presentation(), Presentation::Minimized);
    assert_eq!(widget.resume_countdown(), None);
}

#[test]
fn widget_state_tests_upload_failure_shows_detail_and_enables_retry() {
    let mut widget = widget();
    widget.on_phase(SessionPhase::Uploading, 0, 12_000);
    assert_eq!(widget.status(), Some(UPLOADING_STATUS));
    assert!(!widget.accepts(Command::Retry));

    widget.on_phase(SessionPhase::Error, 10, 12_000);
    widget.on_upload_failed("disk full");
    assert_eq!(widget.status(), Some("disk full"));
    assert!(widget.retry_enabled());
    assert!(widget.accepts(Command::Retry));

    widget.on_phase(SessionPhase::Uploading, 20, 12_000);
    assert!(!widget.retry_enabled());
    widget.on_phase(SessionPhase::Done, 30, 12_000);
    assert_eq!(widget.status(), Some(UPLOADED_STATUS));
    assert!(widget.visible_commands().is_empty());
}

#[test]
fn widget_state_tests_commands_follow_phase() {
    let mut widget = widget();
    assert!(widget.accepts(Command::Start));
    assert!(widget.accepts(Command::ClearMasks));
    assert!(!widget.accepts(Command::Pause));

    widget.on_phase(SessionPhase::Recording, 0, 0);
    assert!(widget.accepts(Command::Pause));
    assert!(widget.accepts(Command::Stop));
    assert!(!widget.accepts(Command::Resume));
    assert!(!widget.accepts(Command::Start));

    widget.on_phase(SessionPhase::Paused, 0, 0);
    assert!(widget.accepts(Command::Resume));
    assert!(!widget.accepts(Command::Pause));
}

#[test]
fn widget_state_tests_permission_denied_is_neutral() {
    let mut widget = widget();
    widget.on_phase(SessionPhase::AwaitingPermission, 0, 0);
    widget.on_phase(SessionPhase::Idle, 0, 0);
    widget.on_permission_denied();

    assert_eq!(widget.status(), Some(CANCELLED_STATUS));
    assert!(widget.accepts(Command::Start));
    assert!(!widget.retry_enabled());
}

#[test]
fn widget_state_tests_ripples_expire() {
    let mut widget = widget();
    widget.add_ripple(10, 20, 1_000);
    assert_eq!(widget.ripples().len(), 1);
    assert!(!widget.tick(1_599, 0));
    assert!(widget.tick(1_600, 0));
    assert!(widget.ripples().is_empty());
}

#[test]
fn widget_state_tests_render_is_scoped_and_escaped() {
    let mut widget = FloatingControlWidget::new(
        "<script>alert(1)</script>",
        "0.1.0",
        &RecorderConfig::default(),
    );
    widget.set_privacy(PrivacyConfig {
        enabled: true,
        active_tool: MaskTool::Blur,
    });

    let (stylesheet, markup) = widget.render();
    assert!(stylesheet.starts_with(":host"));
    assert!(!markup.contains("<script>"));
    assert!(markup.contains("&lt;script&gt;"));
    assert!(markup.contains("data-command=\"toggle-privacy\" class=\"active\""));
    assert!(markup.contains("data-command=\"tool-blur\" class=\"active\""));
    assert!(markup.contains("data-command=\"tool-mask\">"));
    assert!(markup.contains("data-phase=\"idle\""));
}
