#![warn(missing_docs)]
//! # screen-veil-app binary
//!
//! Headless dry run: injects into a synthetic page, records a short capture
//! against the synthetic backend, and uploads it through a loopback
//! transport. Useful for checking configuration and log output.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use log::info;
use screen_veil_app::{Dependencies, InitRequest, app_version, bootstrap, drive_upload};
use screen_veil_capture::SyntheticCaptureBackend;
use screen_veil_core::{MediaChunk, RecorderConfig};
use screen_veil_page::Page;
use screen_veil_storage::MemoryStore;
use screen_veil_ui::Command;
use screen_veil_upload::{HttpResponse, UploadEnvelope, UploadError, UploadTransport};

const DEFAULT_PAGE_URL: &str = "https://erp.example.test/invoices";

struct LoopbackTransport;

impl UploadTransport for LoopbackTransport {
    fn send(&self, envelope: &UploadEnvelope) -> Result<HttpResponse, UploadError> {
        info!(
            "loopback received {} ({} body bytes)",
            envelope.file_name,
            envelope.body.len()
        );
        Ok(HttpResponse {
            status: 200,
            body: "{}".to_string(),
        })
    }
}

/// CLI entry point.
fn main() {
    env_logger::init();

    if let Err(error) = run() {
        eprintln!("screen-veil dry run failed: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = RecorderConfig::from_env()?;
    println!("screen-veil-app {}", app_version());
    println!(
        "capture_enabled={} (SCREEN_VEIL_CAPTURE_ENABLED)",
        config.capture_enabled
    );

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PAGE_URL.to_string());
    let page = Rc::new(RefCell::new(Page::new(&url)?));
    let teardown_delay_ms = config.teardown_delay_ms;
    let countdown_ms = u64::from(config.countdown_secs) * 1_000;

    let deps = Dependencies {
        config,
        store: Rc::new(MemoryStore::new()),
        capture: Box::new(SyntheticCaptureBackend::new()),
        transport: Arc::new(LoopbackTransport),
    };
    let request = InitRequest {
        title: "Dry run".to_string(),
        module_id: "0".to_string(),
        privacy_mode: false,
    };
    let handle = bootstrap(&page, request, deps, 0)?;
    let mut manager = handle.borrow_mut();

    manager.handle_command(Command::Start, 0)?;
    manager.on_stream_granted(10);
    let mut now = 10;
    while now <= 10 + countdown_ms {
        manager.tick(now);
        now += 1_000;
    }
    for sequence in 0..3 {
        manager.on_chunk(MediaChunk::new(sequence, vec![0x1a; 256]));
        now += 1_000;
        manager.tick(now);
    }
    manager.handle_command(Command::Stop, now)?;
    manager.on_recorder_stopped(now);
    drop(manager);

    drive_upload(&handle, now);
    let mut manager = handle.borrow_mut();
    let snapshot = manager.status_snapshot(now);
    println!(
        "phase={:?} timer={} status={}",
        snapshot.phase,
        snapshot.timer,
        snapshot.status.as_deref().unwrap_or("-")
    );

    manager.tick(now + teardown_delay_ms);
    println!("disposed={}", manager.is_disposed());
    Ok(())
}
