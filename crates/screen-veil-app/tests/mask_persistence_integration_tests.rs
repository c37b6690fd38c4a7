//! Integration tests for masks across reloads and page mutations.

mod common;

use common::{Fixture, RecordingObserver};
use screen_veil_app::Notification;
use screen_veil_core::MaskTool;
use screen_veil_mask::{BLUR_CLASS, HOVER_CLASS, is_masked};
use screen_veil_page::PointerEvent;
use screen_veil_ui::Command;

#[test]
fn mask_persistence_integration_tests_masks_survive_reinjection_on_reload() {
    let fixture = Fixture::new();
    {
        let manager = fixture.inject(true);
        let mut manager = manager.borrow_mut();
        let mut click = PointerEvent::new(fixture.ssn_field, 2, 2);
        manager.handle_click(&mut click, 0);
        assert!(click.propagation_stopped());
    }
    assert_eq!(
        fixture.store.raw("masks_erp.example.test").as_deref(),
        Some(r##"["#ssn-field"]"##)
    );

    let mut reloaded = Fixture::new();
    reloaded.store = fixture.store.clone();
    let manager = reloaded.inject(false);

    assert!(is_masked(&reloaded.page.borrow(), reloaded.ssn_field));
    assert_eq!(manager.borrow().status_snapshot(0).mask_rules, 1);
}

#[test]
fn mask_persistence_integration_tests_rerendered_content_is_masked_on_next_tick() {
    let fixture = Fixture::new();
    let manager = fixture.inject(true);
    let mut manager = manager.borrow_mut();
    let mut click = PointerEvent::new(fixture.ssn_field, 2, 2);
    manager.handle_click(&mut click, 0);

    let replacement = {
        let mut page = fixture.page.borrow_mut();
        page.remove(fixture.ssn_field);
        let field = page.create_element("input");
        page.set_element_id(field, "ssn-field");
        let body = page.body();
        page.append_child(body, field).expect("append should work");
        field
    };
    assert!(!is_masked(&fixture.page.borrow(), replacement));

    manager.tick(100);
    assert!(is_masked(&fixture.page.borrow(), replacement));
}

#[test]
fn mask_persistence_integration_tests_blur_tool_and_clear_masks() {
    let fixture = Fixture::new();
    let banner = {
        let mut page = fixture.page.borrow_mut();
        let banner = page.create_element("div");
        page.add_class(banner, "account-banner");
        let body = page.body();
        page.append_child(body, banner).expect("append should work");
        banner
    };
    let manager = fixture.inject(true);
    let observer = RecordingObserver::default();
    let seen = observer.seen.clone();
    let mut manager = manager.borrow_mut();
    manager.subscribe(Box::new(observer));

    manager
        .handle_command(Command::SelectTool(MaskTool::Blur), 0)
        .expect("tool selection should be offered");
    assert_eq!(manager.widget().privacy().active_tool, MaskTool::Blur);
    assert!(
        seen.borrow()
            .iter()
            .any(|notification| matches!(notification, Notification::Privacy(config) if config.active_tool == MaskTool::Blur))
    );

    manager.handle_mouse_over(banner);
    assert!(fixture.page.borrow().has_class(banner, HOVER_CLASS));
    let mut click = PointerEvent::new(banner, 4, 4);
    manager.handle_click(&mut click, 10);
    manager.handle_mouse_out(banner);
    {
        let page = fixture.page.borrow();
        assert!(page.has_class(banner, BLUR_CLASS));
        assert!(!page.has_class(banner, HOVER_CLASS));
    }

    manager
        .handle_command(Command::ClearMasks, 20)
        .expect("clear should be offered");
    assert!(!fixture.page.borrow().has_class(banner, BLUR_CLASS));
    assert_eq!(fixture.store.raw("masks_erp.example.test"), None);
}

#[test]
fn mask_persistence_integration_tests_widget_clicks_are_never_masked() {
    let fixture = Fixture::new();
    let manager = fixture.inject(true);
    let mut manager = manager.borrow_mut();
    let root = manager.widget_root().expect("widget should be mounted");

    let mut click = PointerEvent::new(root, 900, 20);
    manager.handle_click(&mut click, 0);

    assert!(!click.default_prevented());
    assert_eq!(manager.masking().rules().count(), 0);
}
