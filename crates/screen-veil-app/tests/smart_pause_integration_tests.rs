//! Integration tests for hold-to-peek during a recording.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{Fixture, RecordingObserver, feed_chunks, start_recording};
use screen_veil_app::{Notification, SessionManager};
use screen_veil_core::SessionPhase;
use screen_veil_mask::{PAUSED_CLASS, PEEKING_CLASS, is_masked};
use screen_veil_page::{KeyEvent, PointerEvent};
use screen_veil_ui::Command;

fn masked_recording_fixture() -> (Fixture, Rc<RefCell<SessionManager>>) {
    let fixture = Fixture::new();
    let manager = fixture.inject(true);
    {
        let mut manager = manager.borrow_mut();
        let mut click = PointerEvent::new(fixture.ssn_field, 1, 1);
        manager.handle_click(&mut click, 0);
        start_recording(&mut manager, 0);
    }
    assert!(is_masked(&fixture.page.borrow(), fixture.ssn_field));
    (fixture, manager)
}

#[test]
fn smart_pause_integration_tests_hold_lifts_masks_and_release_restores_them() {
    let (fixture, manager) = masked_recording_fixture();
    let mut manager = manager.borrow_mut();

    manager.handle_key_down(&KeyEvent::new("Alt"), 5_000);
    manager.tick(5_299);
    assert_eq!(manager.phase(), SessionPhase::Recording);

    manager.handle_key_down(&KeyEvent::repeated("Alt"), 5_250);
    manager.tick(5_300);
    assert_eq!(manager.phase(), SessionPhase::Paused);
    assert!(manager.widget().smart_paused());
    assert!(manager.status_snapshot(5_300).smart_paused);
    {
        let page = fixture.page.borrow();
        let body = page.body();
        assert!(page.has_class(body, PEEKING_CLASS));
        assert!(page.has_class(body, PAUSED_CLASS));
        assert!(!is_masked(&page, fixture.ssn_field));
    }

    manager.handle_key_up(&KeyEvent::new("Alt"), 8_000);
    assert_eq!(manager.phase(), SessionPhase::Recording);
    assert!(!manager.widget().smart_paused());
    let page = fixture.page.borrow();
    let body = page.body();
    assert!(!page.has_class(body, PEEKING_CLASS));
    assert!(!page.has_class(body, PAUSED_CLASS));
    assert!(is_masked(&page, fixture.ssn_field));
}

#[test]
fn smart_pause_integration_tests_quick_tap_never_pauses() {
    let (_fixture, manager) = masked_recording_fixture();
    let mut manager = manager.borrow_mut();

    manager.handle_key_down(&KeyEvent::new("Alt"), 5_000);
    manager.handle_key_up(&KeyEvent::new("Alt"), 5_120);
    manager.tick(5_400);

    assert_eq!(manager.phase(), SessionPhase::Recording);
    assert!(!manager.widget().smart_paused());
}

#[test]
fn smart_pause_integration_tests_clicks_during_peek_are_not_consumed() {
    let (fixture, manager) = masked_recording_fixture();
    let mut manager = manager.borrow_mut();

    manager.handle_key_down(&KeyEvent::new("Alt"), 5_000);
    manager.tick(5_300);

    let mut click = PointerEvent::new(fixture.ssn_field, 3, 3);
    manager.handle_click(&mut click, 5_400);
    assert!(!click.default_prevented());
    assert!(manager.masking().has_rule("#ssn-field"));
}

#[test]
fn smart_pause_integration_tests_deliberate_resume_counts_down() {
    let (fixture, manager) = masked_recording_fixture();
    let mut manager = manager.borrow_mut();

    manager.handle_key_down(&KeyEvent::new("Alt"), 5_000);
    manager.tick(5_300);
    assert_eq!(
        manager.widget().visible_commands(),
        vec![Command::SmartResume, Command::Stop]
    );

    manager
        .handle_command(Command::SmartResume, 6_000)
        .expect("smart resume should be offered");
    assert_eq!(manager.widget().resume_countdown(), Some(3));

    manager.tick(7_000);
    manager.tick(8_000);
    assert_eq!(manager.widget().resume_countdown(), Some(1));
    assert_eq!(manager.phase(), SessionPhase::Paused);

    manager.tick(9_000);
    assert_eq!(manager.phase(), SessionPhase::Recording);
    assert_eq!(manager.widget().resume_countdown(), None);
    assert!(is_masked(&fixture.page.borrow(), fixture.ssn_field));
    assert_eq!(manager.status_snapshot(9_000).timer, "00:02");
}

#[test]
fn smart_pause_integration_tests_hold_outside_recording_is_ignored() {
    let fixture = Fixture::new();
    let manager = fixture.inject(false);
    let mut manager = manager.borrow_mut();

    manager.handle_key_down(&KeyEvent::new("Alt"), 0);
    manager.tick(1_000);

    assert_eq!(manager.phase(), SessionPhase::Idle);
    assert!(!manager.widget().smart_paused());
}

#[test]
fn smart_pause_integration_tests_stop_while_held_restores_masks_and_finishes() {
    let (fixture, manager) = masked_recording_fixture();
    let observer = RecordingObserver::default();
    let mut manager = manager.borrow_mut();
    manager.subscribe(Box::new(observer.clone()));
    feed_chunks(&mut manager, 2);

    manager.handle_key_down(&KeyEvent::new("Alt"), 5_000);
    manager.tick(5_300);
    assert!(manager.widget().accepts(Command::Stop));

    manager
        .handle_command(Command::Stop, 6_000)
        .expect("stop should be offered during smart pause");
    assert_eq!(manager.phase(), SessionPhase::Stopping);
    assert!(!manager.widget().smart_paused());
    assert!(!manager.status_snapshot(6_000).smart_paused);
    assert!(!manager.masking().is_peeking());
    {
        let page = fixture.page.borrow();
        let body = page.body();
        assert!(!page.has_class(body, PEEKING_CLASS));
        assert!(!page.has_class(body, PAUSED_CLASS));
        assert!(is_masked(&page, fixture.ssn_field));
    }
    assert!(
        observer
            .seen
            .borrow()
            .contains(&Notification::SmartPause(false))
    );

    manager.handle_key_up(&KeyEvent::new("Alt"), 6_500);
    manager.on_recorder_stopped(6_600);
    assert_eq!(manager.phase(), SessionPhase::Uploading);
    assert!(manager.has_pending_upload());
}
