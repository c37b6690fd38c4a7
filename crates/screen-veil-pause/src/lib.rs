#![warn(missing_docs)]
//! # screen-veil-pause
//!
//! ## Purpose
//! Turns a held modifier key into a temporary pause of the active capture
//! ("smart pause"), during which masked content is revealed.
//!
//! ## Responsibilities
//! - Arm a hold timer on modifier keydown while a capture is recording.
//! - Engage once the hold delay elapses; release on keyup.
//! - Run the visible countdown of the deliberate resume path.
//!
//! ## Data flow
//! Page key events and loop ticks -> [`SmartPauseController`] ->
//! [`PauseEvent`] queue -> session manager pauses/resumes the capture and
//! toggles mask peek.
//!
//! ## Error model
//! Nothing here fails; events that do not apply are ignored.

use std::collections::VecDeque;

use log::{debug, info};
use screen_veil_core::RecorderConfig;
use screen_veil_page::KeyEvent;

/// Transition emitted by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseEvent {
    /// Hold delay elapsed: pause the capture and lift masks.
    Engaged,
    /// Key released or resume countdown finished: resume and restore masks.
    Released,
    /// Resume countdown value now shown.
    ResumeCountdown(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldState {
    Idle,
    Armed { fires_at_ms: u64 },
    Held,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResumeCountdown {
    remaining: u32,
    next_tick_at_ms: u64,
}

/// Modifier-hold gesture state machine.
#[derive(Debug, Clone)]
pub struct SmartPauseController {
    modifier_key: String,
    hold_delay_ms: u64,
    resume_countdown_secs: u32,
    state: HoldState,
    resume: Option<ResumeCountdown>,
    events: VecDeque<PauseEvent>,
}

impl SmartPauseController {
    /// Creates a controller for `modifier_key`.
    pub fn new(modifier_key: impl Into<String>, hold_delay_ms: u64, resume_countdown_secs: u32) -> Self {
        Self {
            modifier_key: modifier_key.into(),
            hold_delay_ms,
            resume_countdown_secs,
            state: HoldState::Idle,
            resume: None,
            events: VecDeque::new(),
        }
    }

    /// Creates a controller from runtime configuration.
    pub fn from_config(config: &RecorderConfig) -> Self {
        Self::new(
            config.modifier_key.clone(),
            config.hold_delay_ms,
            config.resume_countdown_secs,
        )
    }

    /// Returns `true` while smart pause holds the capture.
    pub fn is_paused(&self) -> bool {
        self.state == HoldState::Held
    }

    /// Returns `true` while a hold timer is pending.
    pub fn is_armed(&self) -> bool {
        matches!(self.state, HoldState::Armed { .. })
    }

    /// Remaining resume countdown seconds, when one is running.
    pub fn resume_countdown(&self) -> Option<u32> {
        self.resume.map(|countdown| countdown.remaining)
    }

    /// Handles a keydown. Only a first (non-repeat) modifier press while
    /// `recording` arms the timer.
    pub fn on_key_down(&mut self, event: &KeyEvent, now_ms: u64, recording: bool) {
        if event.key != self.modifier_key || event.repeat || !recording {
            return;
        }
        if self.state != HoldState::Idle {
            return;
        }

        self.state = HoldState::Armed {
            fires_at_ms: now_ms.saturating_add(self.hold_delay_ms),
        };
        debug!("smart pause armed at {now_ms}");
    }

    /// Handles a keyup. Cancels a pending timer, or releases an engaged hold.
    pub fn on_key_up(&mut self, event: &KeyEvent) {
        if event.key != self.modifier_key {
            return;
        }

        match self.state {
            HoldState::Idle => {}
            HoldState::Armed { .. } => {
                self.state = HoldState::Idle;
                debug!("smart pause cancelled before hold delay");
            }
            HoldState::Held => self.release(),
        }
    }

    /// Fires due timers. `recording` is re-checked when the hold timer fires
    /// so a capture stopped during the hold is never paused.
    pub fn on_tick(&mut self, now_ms: u64, recording: bool) {
        if let HoldState::Armed { fires_at_ms } = self.state
            && now_ms >= fires_at_ms
        {
            if recording {
                self.state = HoldState::Held;
                self.events.push_back(PauseEvent::Engaged);
                info!("smart pause engaged");
            } else {
                self.state = HoldState::Idle;
            }
        }

        while let Some(countdown) = self.resume {
            if now_ms < countdown.next_tick_at_ms {
                break;
            }
            let remaining = countdown.remaining.saturating_sub(1);
            if remaining == 0 {
                self.release();
                break;
            }
            self.resume = Some(ResumeCountdown {
                remaining,
                next_tick_at_ms: countdown.next_tick_at_ms.saturating_add(1_000),
            });
            self.events.push_back(PauseEvent::ResumeCountdown(remaining));
        }
    }

    /// Starts the deliberate resume countdown. No-op unless paused or when a
    /// countdown already runs.
    pub fn request_resume(&mut self, now_ms: u64) {
        if !self.is_paused() || self.resume.is_some() {
            return;
        }
        if self.resume_countdown_secs == 0 {
            self.release();
            return;
        }

        self.resume = Some(ResumeCountdown {
            remaining: self.resume_countdown_secs,
            next_tick_at_ms: now_ms.saturating_add(1_000),
        });
        self.events
            .push_back(PauseEvent::ResumeCountdown(self.resume_countdown_secs));
    }

    /// Drops every pending timer without emitting events.
    pub fn reset(&mut self) {
        self.state = HoldState::Idle;
        self.resume = None;
        self.events.clear();
    }

    /// Removes and returns queued events in emission order.
    pub fn drain_events(&mut self) -> Vec<PauseEvent> {
        self.events.drain(..).collect()
    }

    fn release(&mut self) {
        self.state = HoldState::Idle;
        self.resume = None;
        self.events.push_back(PauseEvent::Released);
        info!("smart pause released");
    }
}
