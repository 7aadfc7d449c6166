//! Trigger tables for field state machines
//!
//! Which DOM events start, update and end an interaction depends on the control
//! type. All lookups take the lowercased DOM `type`.

use crate::form::DomEvent;

/// Keys counted as corrections
const CORRECTION_KEYS: [&str; 3] = ["Backspace", "Delete", "Insert"];

/// Modifier and control keys counted separately from text input
const SPECIAL_KEYS: [&str; 5] = ["Shift", "Control", "Meta", "ContextMenu", "Escape"];

/// Control types whose keystrokes and pastes are counted
const KEYSTROKE_TYPES: [&str; 4] = ["text", "textarea", "email", "password"];

/// Control types that also finalize when Enter is pressed
const ENTER_FINALIZE_TYPES: [&str; 4] = ["text", "email", "password", "select-multiple"];

pub const ENTER_KEY: &str = "Enter";

/// Classification of a keydown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Correction,
    Special,
    Ordinary,
}

pub fn classify_key(key: &str) -> KeyClass {
    if CORRECTION_KEYS.contains(&key) {
        KeyClass::Correction
    } else if SPECIAL_KEYS.contains(&key) {
        KeyClass::Special
    } else {
        KeyClass::Ordinary
    }
}

/// The DOM event that ends an interaction with a control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTrigger {
    Change,
    Click,
    Blur,
}

impl EndTrigger {
    pub fn for_type(control_type: &str) -> Self {
        match control_type {
            "file" => EndTrigger::Change,
            "submit" | "button" => EndTrigger::Click,
            _ => EndTrigger::Blur,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndTrigger::Change => "change",
            EndTrigger::Click => "click",
            EndTrigger::Blur => "blur",
        }
    }

    pub fn matches(&self, event: &DomEvent) -> bool {
        matches!(
            (self, event),
            (EndTrigger::Change, DomEvent::Change)
                | (EndTrigger::Click, DomEvent::Click)
                | (EndTrigger::Blur, DomEvent::Blur)
        )
    }
}

pub fn tracks_keystrokes(control_type: &str) -> bool {
    KEYSTROKE_TYPES.contains(&control_type)
}

pub fn finalizes_on_enter(control_type: &str) -> bool {
    ENTER_FINALIZE_TYPES.contains(&control_type)
}
