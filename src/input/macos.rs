//! CoreGraphics input backend
//!
//! Reads physical key and button state from the HID system state and posts
//! synthetic keyboard events at the HID tap location.

use core_graphics::event::{CGEvent, CGEventTapLocation};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use tracing::trace;

use super::{InputBackend, InputError, Key};

/// kCGEventSourceStateHIDSystemState
const HID_SYSTEM_STATE: i32 = 1;
/// kCGMouseButtonRight
const MOUSE_BUTTON_RIGHT: u32 = 1;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventSourceKeyState(state_id: i32, key: u16) -> bool;
    fn CGEventSourceButtonState(state_id: i32, button: u32) -> bool;
}

/// Input backend backed by the CoreGraphics event APIs
///
/// Requires the Accessibility permission for injected events to reach
/// other applications.
#[derive(Debug, Default)]
pub struct CoreGraphicsBackend;

impl CoreGraphicsBackend {
    /// Create the backend, checking that an event source can be opened
    pub fn new() -> Result<Self, InputError> {
        CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| InputError::EventSource)?;
        Ok(Self)
    }

    fn post_key(&self, key: Key, down: bool) -> Result<(), InputError> {
        // CGEventSource is not Send; a fresh source per event keeps the
        // backend shareable across the poll loop and watchdog.
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| InputError::EventSource)?;
        let event = CGEvent::new_keyboard_event(source, key.code(), down)
            .map_err(|_| InputError::EventCreation(key))?;
        event.post(CGEventTapLocation::HID);
        trace!(key = %key, down, "posted keyboard event");
        Ok(())
    }
}

impl InputBackend for CoreGraphicsBackend {
    fn is_pressed(&self, key: Key) -> Result<bool, InputError> {
        // SAFETY: plain query with no pointers involved
        Ok(unsafe { CGEventSourceKeyState(HID_SYSTEM_STATE, key.code()) })
    }

    fn press(&self, key: Key) -> Result<(), InputError> {
        self.post_key(key, true)
    }

    fn release(&self, key: Key) -> Result<(), InputError> {
        self.post_key(key, false)
    }

    fn is_right_button_pressed(&self) -> Option<bool> {
        // SAFETY: plain query with no pointers involved
        Some(unsafe { CGEventSourceButtonState(HID_SYSTEM_STATE, MOUSE_BUTTON_RIGHT) })
    }
}
