//! Form and control model
//!
//! The host describes the page's form as a list of controls in DOM order. The
//! tracker never mutates these values; per-control tracking state is kept in the
//! tracker, keyed by [`ControlId`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity of a control: its index in DOM order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(pub usize);

/// One `<option>` of a select control
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectOption {
    pub text: String,
    pub value: String,
    pub selected: bool,
}

impl SelectOption {
    pub fn new(text: &str, selected: bool) -> Self {
        Self {
            text: text.to_string(),
            value: text.to_string(),
            selected,
        }
    }
}

/// A form control (input, select, textarea or button) and its current state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Control {
    /// Element tag name (`input`, `select`, `textarea`, `button`)
    pub tag: String,
    /// DOM `type` property (`text`, `select-one`, `textarea`, `submit`, ...)
    #[serde(rename = "type")]
    pub control_type: String,
    pub name: String,
    pub id: String,
    pub class_name: String,
    pub alt: String,
    pub title: String,
    pub access_key: String,
    pub content_editable: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_menu: Option<String>,
    pub dir: String,
    pub lang: String,
    pub spellcheck: bool,
    /// Inline style (`cssText`)
    pub style: String,
    /// Declared tab index; 0 when not declared
    pub tab_index: i32,
    pub required: bool,
    pub pattern: String,
    pub read_only: bool,
    pub checked: bool,
    pub disabled: bool,
    /// `data-*` attributes
    pub dataset: BTreeMap<String, String>,
    /// Values of the associated `<datalist>`, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<String>>,
    /// Options of a select control
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    pub value: String,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            tag: "input".to_string(),
            control_type: "text".to_string(),
            name: String::new(),
            id: String::new(),
            class_name: String::new(),
            alt: String::new(),
            title: String::new(),
            access_key: String::new(),
            content_editable: "inherit".to_string(),
            context_menu: None,
            dir: String::new(),
            lang: String::new(),
            spellcheck: true,
            style: String::new(),
            tab_index: 0,
            required: false,
            pattern: String::new(),
            read_only: false,
            checked: false,
            disabled: false,
            dataset: BTreeMap::new(),
            list: None,
            options: Vec::new(),
            value: String::new(),
        }
    }
}

impl Control {
    /// An `<input>` of the given type
    pub fn input(control_type: &str) -> Self {
        Self {
            control_type: control_type.to_string(),
            ..Self::default()
        }
    }

    pub fn textarea() -> Self {
        Self {
            tag: "textarea".to_string(),
            control_type: "textarea".to_string(),
            ..Self::default()
        }
    }

    pub fn select(multiple: bool, options: Vec<SelectOption>) -> Self {
        Self {
            tag: "select".to_string(),
            control_type: if multiple { "select-multiple" } else { "select-one" }.to_string(),
            options,
            ..Self::default()
        }
    }

    /// A `<button>` of the given type (`submit`, `button`, `reset`)
    pub fn button(control_type: &str) -> Self {
        Self {
            tag: "button".to_string(),
            control_type: control_type.to_string(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_tab_index(mut self, tab_index: i32) -> Self {
        self.tab_index = tab_index;
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    /// Lowercased control type
    pub fn kind(&self) -> String {
        self.control_type.to_lowercase()
    }

    pub fn is_hidden(&self) -> bool {
        self.kind() == "hidden"
    }

    /// Current value as the collector sees it.
    ///
    /// Selects report the text of every selected option joined with `"; "`,
    /// checkboxes report their value only when checked.
    pub fn current_value(&self) -> String {
        match self.kind().as_str() {
            "select-one" | "select-multiple" => self
                .options
                .iter()
                .filter(|o| o.selected)
                .map(|o| o.text.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            "checkbox" => {
                if self.checked {
                    self.value.clone()
                } else {
                    String::new()
                }
            }
            _ => self.value.clone(),
        }
    }

    /// Apply a state change reported by the host
    pub fn apply(&mut self, update: &ControlUpdate) {
        if let Some(value) = &update.value {
            self.value = value.clone();
        }
        if let Some(checked) = update.checked {
            self.checked = checked;
        }
        if let Some(selected) = &update.selected {
            for (i, option) in self.options.iter_mut().enumerate() {
                option.selected = selected.contains(&i);
            }
        }
    }
}

/// A change to a control's state between two events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlUpdate {
    pub value: Option<String>,
    pub checked: Option<bool>,
    /// Indices of the options that are selected after the change
    pub selected: Option<Vec<usize>>,
}

/// DOM-level events the tracker consumes for a single control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DomEvent {
    Focus,
    Blur,
    Change,
    Click,
    Keydown { key: String },
    Paste,
}

impl DomEvent {
    pub fn key_down(key: &str) -> Self {
        DomEvent::Keydown {
            key: key.to_string(),
        }
    }
}

/// The instrumented form: its controls in DOM order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub controls: Vec<Control>,
}

impl Form {
    pub fn new(controls: Vec<Control>) -> Self {
        Self { controls }
    }

    pub fn control(&self, id: ControlId) -> Option<&Control> {
        self.controls.get(id.0)
    }

    pub fn control_mut(&mut self, id: ControlId) -> Option<&mut Control> {
        self.controls.get_mut(id.0)
    }

    pub fn ids(&self) -> impl Iterator<Item = ControlId> {
        (0..self.controls.len()).map(ControlId)
    }

    fn inputs(&self) -> impl Iterator<Item = &Control> {
        self.controls.iter().filter(|c| c.tag == "input")
    }

    /// Number of `<input>` controls
    pub fn input_count(&self) -> u32 {
        self.inputs().count() as u32
    }

    /// Number of `<input type=hidden>` controls
    pub fn hidden_count(&self) -> u32 {
        self.inputs().filter(|c| c.is_hidden()).count() as u32
    }

    /// Number of disabled `<input>` controls
    pub fn disabled_count(&self) -> u32 {
        self.inputs().filter(|c| c.disabled).count() as u32
    }

    pub fn has_hidden_fields(&self) -> bool {
        self.hidden_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_value_joins_selected_option_text() {
        let select = Control::select(
            true,
            vec![
                SelectOption::new("Red", true),
                SelectOption::new("Green", false),
                SelectOption::new("Blue", true),
            ],
        );
        assert_eq!(select.current_value(), "Red; Blue");
    }

    #[test]
    fn test_checkbox_value_only_when_checked() {
        let mut checkbox = Control::input("checkbox").with_value("yes");
        assert_eq!(checkbox.current_value(), "");

        checkbox.checked = true;
        assert_eq!(checkbox.current_value(), "yes");
    }

    #[test]
    fn test_apply_update() {
        let mut select = Control::select(
            false,
            vec![SelectOption::new("One", true), SelectOption::new("Two", false)],
        );
        select.apply(&ControlUpdate {
            selected: Some(vec![1]),
            ..ControlUpdate::default()
        });
        assert_eq!(select.current_value(), "Two");
    }

    #[test]
    fn test_form_counts() {
        let mut disabled = Control::input("text");
        disabled.disabled = true;
        let form = Form::new(vec![
            Control::input("hidden"),
            disabled,
            Control::textarea(),
            Control::button("submit"),
        ]);

        assert_eq!(form.input_count(), 2);
        assert_eq!(form.hidden_count(), 1);
        assert_eq!(form.disabled_count(), 1);
        assert!(form.has_hidden_fields());
    }

    #[test]
    fn test_control_deserialization_defaults() {
        let json = r#"{"type": "email", "name": "email", "tabIndex": 2}"#;
        let control: Control = serde_json::from_str(json).unwrap();

        assert_eq!(control.tag, "input");
        assert_eq!(control.kind(), "email");
        assert_eq!(control.tab_index, 2);
        assert!(control.spellcheck);
    }

    #[test]
    fn test_dom_event_serialization() {
        let event: DomEvent = serde_json::from_str(r#"{"type": "keydown", "key": "Enter"}"#).unwrap();
        assert_eq!(event, DomEvent::key_down("Enter"));

        let json = serde_json::to_string(&DomEvent::Blur).unwrap();
        assert_eq!(json, r#"{"type":"blur"}"#);
    }
}
