// Debounced push-button flags shared between GPIO interrupts and the main loop.
// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Hiroshi Nakajima

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// An edge is accepted only if strictly more than this many milliseconds
/// passed since the same button's last accepted edge. An edge exactly
/// 200 ms later is rejected.
pub const DEBOUNCE_MS: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Left button, labelled MENU: next menu row / next displayed channel.
    Next,
    /// Right button, labelled SELECT: toggle / start / stop.
    Activate,
}

/// One-shot flags taken by the main loop in a single iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Buttons {
    pub next: bool,
    pub activate: bool,
}

impl Buttons {
    pub fn any(&self) -> bool {
        self.next || self.activate
    }
}

struct ButtonState {
    pending: AtomicBool,
    seen: AtomicBool,
    last_accepted_ms: AtomicU32,
}

impl ButtonState {
    const fn new() -> Self {
        ButtonState {
            pending: AtomicBool::new(false),
            seen: AtomicBool::new(false),
            last_accepted_ms: AtomicU32::new(0),
        }
    }
}

/// Interrupt handlers only call [`InputController::on_edge`]; the main loop
/// only calls [`InputController::take`]. Neither blocks.
pub struct InputController {
    next: ButtonState,
    activate: ButtonState,
    suppressed: AtomicBool,
    last_activity_ms: AtomicU32,
}

impl InputController {
    pub const fn new() -> Self {
        InputController {
            next: ButtonState::new(),
            activate: ButtonState::new(),
            suppressed: AtomicBool::new(false),
            last_activity_ms: AtomicU32::new(0),
        }
    }

    fn state(&self, button: Button) -> &ButtonState {
        match button {
            Button::Next => &self.next,
            Button::Activate => &self.activate,
        }
    }

    /// Falling edge on `button` at `now_ms`. Returns whether it was accepted.
    pub fn on_edge(&self, button: Button, now_ms: u32) -> bool {
        if self.suppressed.load(Ordering::Acquire) {
            return false;
        }
        let state = self.state(button);
        if state.seen.load(Ordering::Acquire) {
            let last = state.last_accepted_ms.load(Ordering::Acquire);
            if now_ms.wrapping_sub(last) <= DEBOUNCE_MS {
                return false;
            }
        }
        state.last_accepted_ms.store(now_ms, Ordering::Release);
        state.seen.store(true, Ordering::Release);
        self.last_activity_ms.store(now_ms, Ordering::Release);
        state.pending.store(true, Ordering::Release);
        true
    }

    /// Reads and clears both flags.
    pub fn take(&self) -> Buttons {
        Buttons {
            next: self.next.pending.swap(false, Ordering::AcqRel),
            activate: self.activate.pending.swap(false, Ordering::AcqRel),
        }
    }

    pub fn set_suppressed(&self, suppressed: bool) {
        self.suppressed.store(suppressed, Ordering::Release);
    }

    pub fn last_activity_ms(&self) -> u32 {
        self.last_activity_ms.load(Ordering::Acquire)
    }

    /// Counts as activity without a button edge (session start, boot end).
    pub fn touch(&self, now_ms: u32) {
        self.last_activity_ms.store(now_ms, Ordering::Release);
    }
}

impl Default for InputController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_edge_is_accepted_and_taken_once() {
        let input = InputController::new();
        assert!(input.on_edge(Button::Next, 5));
        assert_eq!(input.take(), Buttons { next: true, activate: false });
        assert_eq!(input.take(), Buttons::default());
        assert_eq!(input.last_activity_ms(), 5);
    }

    #[test]
    fn bounce_within_window_is_dropped() {
        let input = InputController::new();
        assert!(input.on_edge(Button::Activate, 1000));
        assert!(!input.on_edge(Button::Activate, 1199));
        assert!(input.take().activate);
        assert!(!input.take().activate);
    }

    #[test]
    fn edge_exactly_at_window_is_rejected() {
        let input = InputController::new();
        assert!(input.on_edge(Button::Next, 1000));
        assert!(!input.on_edge(Button::Next, 1200));
        assert!(input.on_edge(Button::Next, 1201));
    }

    #[test]
    fn buttons_debounce_independently() {
        let input = InputController::new();
        assert!(input.on_edge(Button::Next, 1000));
        assert!(input.on_edge(Button::Activate, 1050));
        assert_eq!(input.take(), Buttons { next: true, activate: true });
    }

    #[test]
    fn suppressed_edges_are_ignored_and_do_not_count_as_activity() {
        let input = InputController::new();
        input.touch(10);
        input.set_suppressed(true);
        assert!(!input.on_edge(Button::Activate, 500));
        input.set_suppressed(false);
        assert_eq!(input.take(), Buttons::default());
        assert_eq!(input.last_activity_ms(), 10);
        // the suppressed edge did not open a debounce window
        assert!(input.on_edge(Button::Activate, 550));
    }

    #[test]
    fn window_survives_counter_wrap() {
        let input = InputController::new();
        assert!(input.on_edge(Button::Next, u32::MAX - 50));
        assert!(!input.on_edge(Button::Next, 100));
        assert!(input.on_edge(Button::Next, 200));
    }
}
