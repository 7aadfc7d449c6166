//! Telemetry records sent to `collect-event/`
//!
//! Keys are camelCase and unset values are omitted from the JSON body, which is
//! the shape the collector has always received.

use crate::clock::Millis;
use crate::form::Control;
use serde::{Deserialize, Serialize};

/// Duration reported for a record that has not been finalized
pub const UNFINALIZED_DURATION: i64 = -1;

/// Kind of telemetry record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    FieldFilled,
    FormSubmitted,
}

/// Static metadata of the control a record describes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSnapshot {
    pub field_type: String,
    pub field_tag: String,
    pub field_number: usize,
    pub field_hidden: bool,
    pub field_checked: bool,
    pub field_readonly: bool,
    pub field_name: String,
    pub field_id: String,
    pub field_alt: String,
    pub field_title: String,
    /// JSON-encoded `data-*` attributes
    pub field_data: String,
    pub field_accesskey: String,
    pub field_class: String,
    pub field_contenteditable: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_contextmenu: Option<String>,
    pub field_dir: String,
    pub field_lang: String,
    pub field_spellcheck: String,
    pub field_style: String,
    pub field_tabindex: i32,
    pub field_required: bool,
    pub field_pattern: String,
    /// Datalist values; serialized as `null` when the control has none
    pub field_list: Option<Vec<String>>,
}

impl FieldSnapshot {
    pub fn capture(control: &Control, field_number: usize) -> Self {
        Self {
            field_type: control.kind(),
            field_tag: control.tag.to_lowercase(),
            field_number,
            field_hidden: control.is_hidden(),
            field_checked: control.checked,
            field_readonly: control.read_only,
            field_name: control.name.clone(),
            field_id: control.id.clone(),
            field_alt: control.alt.clone(),
            field_title: control.title.clone(),
            field_data: serde_json::to_string(&control.dataset).unwrap_or_else(|_| "{}".to_string()),
            field_accesskey: control.access_key.clone(),
            field_class: control.class_name.clone(),
            field_contenteditable: control.content_editable.clone(),
            field_contextmenu: control.context_menu.clone(),
            field_dir: control.dir.clone(),
            field_lang: control.lang.clone(),
            field_spellcheck: control.spellcheck.to_string(),
            field_style: control.style.clone(),
            field_tabindex: control.tab_index,
            field_required: control.required,
            field_pattern: control.pattern.clone(),
            field_list: control.list.clone(),
        }
    }
}

/// One telemetry record: a field-filled or form-submitted event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<Millis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<Millis>,
    pub duration: i64,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldSnapshot>,
    pub correction_count: u32,
    pub keypress_count: u32,
    pub special_keypress_count: u32,
    pub text_length: usize,
    pub from_clipboard: bool,
    /// Raw value; never present in no-raw-data mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_data: Option<String>,
}

impl EventRecord {
    /// A fresh, unfinalized record
    pub fn new(event_type: EventType, session: Option<String>) -> Self {
        Self {
            session,
            event_type,
            started: None,
            finished: None,
            duration: UNFINALIZED_DURATION,
            field: None,
            correction_count: 0,
            keypress_count: 0,
            special_keypress_count: 0,
            text_length: 0,
            from_clipboard: false,
            open_data: None,
            hash_data: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.duration != UNFINALIZED_DURATION
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
