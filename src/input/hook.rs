//! The hotkey hook contract.
//!
//! The actual global key grabber is platform plumbing that lives outside
//! this crate; the daemon only depends on the [`InputHook`] trait and the
//! event stream it produces. [`KeyTracker`] holds the press/release
//! bookkeeping every implementation needs (autorepeat dedup, remembering
//! which key started the hold), and [`ChannelHook`] is the in-process
//! implementation used by tests and embedders.

use crossbeam_channel::Sender;

/// Events a hook delivers to the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    /// The talk key (or talk+send key) went down.
    KeyDown { is_send: bool },
    /// The held key was released. `is_send` reflects the key used at the
    /// most recent key-down, not whichever keycode happened to arrive.
    KeyUp { is_send: bool },
}

/// A source of global hotkey events.
pub trait InputHook: Send {
    /// Configure which keysyms act as talk and talk+send.
    fn set_key_codes(&mut self, primary: u32, send: u32);

    /// Begin delivering events to `events`. Returns false if the hook could
    /// not attach (no display, permission denied).
    fn start(&mut self, events: Sender<HookEvent>) -> bool;

    /// Stop delivering events.
    fn stop(&mut self);
}

/// Press/release bookkeeping shared by hook implementations.
///
/// OS key streams repeat the down event while a key is held and may deliver
/// a release for the other hotkey; this reduces them to one down and one up
/// per physical hold.
#[derive(Debug, Default)]
pub struct KeyTracker {
    key_down: bool,
    active_was_send: bool,
}

impl KeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw key press. Returns the event to deliver, or None for
    /// an autorepeat (a press while already down).
    pub fn key_pressed(&mut self, is_send: bool) -> Option<HookEvent> {
        if self.key_down {
            return None;
        }
        self.key_down = true;
        self.active_was_send = is_send;
        Some(HookEvent::KeyDown { is_send })
    }

    /// Register a raw key release. Returns the event to deliver, or None
    /// when no key was down.
    pub fn key_released(&mut self) -> Option<HookEvent> {
        if !self.key_down {
            return None;
        }
        self.key_down = false;
        Some(HookEvent::KeyUp {
            is_send: self.active_was_send,
        })
    }

    /// True while a hold is in progress.
    pub fn is_down(&self) -> bool {
        self.key_down
    }

    /// Drop any in-progress hold (hook restart).
    pub fn reset(&mut self) {
        self.key_down = false;
    }
}

/// In-process hook driven by explicit `press`/`release` calls.
#[derive(Default)]
pub struct ChannelHook {
    tracker: KeyTracker,
    sender: Option<Sender<HookEvent>>,
    primary: u32,
    send: u32,
}

impl ChannelHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a raw key press of the primary or send key.
    pub fn press(&mut self, is_send: bool) {
        if let Some(event) = self.tracker.key_pressed(is_send) {
            self.deliver(event);
        }
    }

    /// Simulate a raw key release.
    pub fn release(&mut self) {
        if let Some(event) = self.tracker.key_released() {
            self.deliver(event);
        }
    }

    /// Configured keysyms (primary, send).
    pub fn key_codes(&self) -> (u32, u32) {
        (self.primary, self.send)
    }

    fn deliver(&self, event: HookEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

impl InputHook for ChannelHook {
    fn set_key_codes(&mut self, primary: u32, send: u32) {
        self.primary = primary;
        self.send = send;
    }

    fn start(&mut self, events: Sender<HookEvent>) -> bool {
        self.tracker.reset();
        self.sender = Some(events);
        true
    }

    fn stop(&mut self) {
        self.sender = None;
        self.tracker.reset();
    }
}
