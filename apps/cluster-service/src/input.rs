//! Physical key events forwarded to the cluster host.

use std::time::Instant;

use once_cell::sync::Lazy;
use serde::Serialize;

pub const KEYCODE_DPAD_DOWN: i32 = 20;
pub const KEYCODE_DPAD_RIGHT: i32 = 22;

static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyEvent {
    pub action: KeyAction,
    pub key_code: i32,
    pub scan_code: i32,
    /// Uptime in milliseconds when the key went down.
    pub down_time_ms: u64,
    /// Uptime in milliseconds of this event.
    pub event_time_ms: u64,
}

/// Milliseconds since the process first asked for the time.
pub fn uptime_millis() -> u64 {
    PROCESS_START.elapsed().as_millis() as u64
}

/// Hardware scan code for the keys a cluster rotary controller emits.
pub fn scan_code_for(key_code: i32) -> i32 {
    match key_code {
        KEYCODE_DPAD_DOWN => 108,
        KEYCODE_DPAD_RIGHT => 106,
        _ => 0,
    }
}

/// The down/up pair a single press of `key_code` produces.
pub fn emulate_press(key_code: i32) -> [KeyEvent; 2] {
    let scan_code = scan_code_for(key_code);
    let down_time_ms = uptime_millis();
    let down = KeyEvent {
        action: KeyAction::Down,
        key_code,
        scan_code,
        down_time_ms,
        event_time_ms: down_time_ms,
    };
    let up = KeyEvent {
        action: KeyAction::Up,
        event_time_ms: uptime_millis(),
        ..down
    };
    [down, up]
}
