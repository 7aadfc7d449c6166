//! Scripted replay
//!
//! A page fixture describes the page a tracker runs on (location, cookies,
//! environment, the form and recorded probe readings). A script is NDJSON, one
//! step per line, replayed against a tracker driven by a manual clock.
//!
//! ```json
//! {"kind": "field", "at": 0, "control": 0, "event": {"type": "focus"}}
//! {"kind": "field", "at": 30, "control": 0, "event": {"type": "blur"}, "update": {"value": "Hello "}}
//! {"kind": "submit", "at": 40}
//! ```

use crate::clock::{ManualClock, Millis};
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::field::FieldOutcome;
use crate::form::{ControlId, ControlUpdate, DomEvent, Form};
use crate::navigation::{DetachedHistory, NavigationEvent};
use crate::session::DocumentCookieJar;
use crate::signals::{recorded_bundle, Environment, PageMetadata, ProbeReadings};
use crate::tracker::{Host, Tracker};
use crate::transport::{Delivery, Transport};
use log::debug;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// The page a replay runs on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageFixture {
    pub location: String,
    pub referrer: String,
    pub title: String,
    /// `document.cookie` at load time
    pub cookie: String,
    pub environment: Environment,
    pub form: Form,
    /// Readings the host's probes produced
    pub probes: ProbeReadings,
}

impl PageFixture {
    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn metadata(&self) -> PageMetadata {
        PageMetadata::capture(&self.environment, &self.location, &self.referrer, &self.title, &self.form)
    }
}

/// What one script line does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    Field {
        control: usize,
        event: DomEvent,
        /// State change applied to the control before the event
        #[serde(default, skip_serializing_if = "Option::is_none")]
        update: Option<ControlUpdate>,
    },
    Submit,
    BeforeUnload,
    PushState {
        #[serde(default)]
        url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Clock reading for the step; the clock keeps its value when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<Millis>,
    #[serde(flatten)]
    pub action: StepAction,
}

/// Parse an NDJSON script. Blank lines and `#` comments are skipped.
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, TrackerError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line.trim())
                .map_err(|e| TrackerError::ScriptError(format!("line {}: {}", i + 1, e)))
        })
        .collect()
}

/// A tracker driven by a script
pub struct Replay {
    tracker: Tracker,
    form: Form,
    clock: Rc<ManualClock>,
}

impl Replay {
    /// Start a tracker on `fixture` with the clock at `start`
    pub fn new(
        config: TrackerConfig,
        fixture: &PageFixture,
        transport: Box<dyn Transport>,
        start: Millis,
    ) -> Result<Self, TrackerError> {
        let clock = Rc::new(ManualClock::new(start));
        let env = &fixture.environment;
        let host = Host {
            clock: Box::new(Rc::clone(&clock)),
            transport,
            cookies: Box::new(DocumentCookieJar::from_header(&fixture.cookie)),
            signals: Box::new(recorded_bundle(&fixture.probes, env.screen_width, env.screen_height)),
            history: Box::new(DetachedHistory),
        };
        let tracker = Tracker::start(config, fixture.metadata(), Some(&fixture.form), host)?;

        Ok(Self {
            tracker,
            form: fixture.form.clone(),
            clock,
        })
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut Tracker {
        &mut self.tracker
    }

    /// The form's state after the steps replayed so far
    pub fn form(&self) -> &Form {
        &self.form
    }

    /// Replay one step, then pump. Returns the deliveries it caused.
    pub fn step(&mut self, step: &ScriptStep) -> Result<Vec<Delivery>, TrackerError> {
        if let Some(at) = step.at {
            self.clock.set(at);
        }

        match &step.action {
            StepAction::Field { control, event, update } => {
                let id = ControlId(*control);
                if let Some(update) = update {
                    self.form
                        .control_mut(id)
                        .ok_or(TrackerError::UnknownControl(*control))?
                        .apply(update);
                }
                let outcome = self.tracker.dispatch(&self.form, id, event)?;
                if outcome != FieldOutcome::Ignored {
                    debug!("control {} {:?}: {:?}", control, event, outcome);
                }
            }
            StepAction::Submit => {
                self.tracker.submit();
            }
            StepAction::BeforeUnload => {
                let mut deliveries = self.tracker.before_unload();
                deliveries.extend(self.tracker.pump());
                return Ok(deliveries);
            }
            StepAction::PushState { url } => {
                let event = NavigationEvent {
                    url: url.clone(),
                    ..NavigationEvent::default()
                };
                self.tracker.push_state(&event);
            }
        }

        Ok(self.tracker.pump())
    }

    /// Replay every step in order
    pub fn run(&mut self, steps: &[ScriptStep]) -> Result<Vec<Delivery>, TrackerError> {
        let mut deliveries = Vec::new();
        for step in steps {
            deliveries.extend(self.step(step)?);
        }
        Ok(deliveries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::content_hash;
    use crate::transport::{OfflineTransport, COLLECT_EVENT_PATH, OPEN_SESSION_PATH};
    use pretty_assertions::assert_eq;

    const FIXTURE: &str = r#"{
        "location": "https://shop.example/signup?ref=mail",
        "title": "Sign up",
        "environment": {"screenWidth": 390, "screenHeight": 844},
        "form": {"controls": [
            {"tag": "input", "type": "text", "name": "greeting"},
            {"tag": "select", "type": "select-multiple", "options": [
                {"text": "Red"}, {"text": "Green"}, {"text": "Blue"}
            ]},
            {"tag": "button", "type": "submit"}
        ]},
        "probes": {"canvas": "c-hash", "plugins": ["PDF Viewer"]}
    }"#;

    const SCRIPT: &str = r#"
        # greeting field
        {"kind": "field", "at": 0, "control": 0, "event": {"type": "focus"}}
        {"kind": "field", "at": 10, "control": 0, "event": {"type": "keydown", "key": "H"}}
        {"kind": "field", "at": 20, "control": 0, "event": {"type": "keydown", "key": "i"}}
        {"kind": "field", "at": 30, "control": 0, "event": {"type": "blur"}, "update": {"value": "Hello "}}
        {"kind": "field", "at": 40, "control": 1, "event": {"type": "change"}, "update": {"selected": [0, 2]}}
        {"kind": "field", "at": 45, "control": 1, "event": {"type": "blur"}}
        {"kind": "push_state", "at": 50, "url": "https://shop.example/done"}
    "#;

    #[test]
    fn test_fixture_parses_camel_case_controls() {
        let fixture = PageFixture::from_json(FIXTURE).unwrap();
        assert_eq!(fixture.form.controls.len(), 3);
        assert_eq!(fixture.form.controls[1].control_type, "select-multiple");
        assert_eq!(fixture.environment.screen_height, 844);
        assert_eq!(fixture.metadata().get_params, "ref=mail");
    }

    #[test]
    fn test_parse_script() {
        let steps = parse_script(SCRIPT).unwrap();
        assert_eq!(steps.len(), 7);
        assert_eq!(steps[0].at, Some(0));
        assert!(matches!(steps[3].action, StepAction::Field { control: 0, update: Some(_), .. }));
        assert_eq!(
            steps[6].action,
            StepAction::PushState {
                url: Some("https://shop.example/done".to_string())
            }
        );
    }

    #[test]
    fn test_parse_script_reports_line() {
        let err = parse_script("{\"kind\": \"submit\"}\n{\"kind\": \"explode\"}").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_replay_end_to_end() {
        let fixture = PageFixture::from_json(FIXTURE).unwrap();
        let transport = Rc::new(OfflineTransport::with_session_id("s-42"));
        let mut replay = Replay::new(
            TrackerConfig::new("px-1", "collect.example"),
            &fixture,
            Box::new(Rc::clone(&transport)),
            0,
        )
        .unwrap();

        let deliveries = replay.run(&parse_script(SCRIPT).unwrap()).unwrap();
        assert_eq!(deliveries.len(), 3);

        let open = &transport.requests_to(OPEN_SESSION_PATH)[0].payload;
        assert_eq!(open["canvas"], "c-hash");
        assert_eq!(open["pluginList"], "PDF Viewer");
        assert_eq!(open["orientation"], "portrait");
        assert!(open["fonts"].is_null());

        let events: Vec<_> = transport
            .requests_to(COLLECT_EVENT_PATH)
            .into_iter()
            .map(|r| r.payload)
            .collect();

        let greeting = &events[0];
        assert_eq!(greeting["session"], "s-42");
        assert_eq!(greeting["started"], 0);
        assert_eq!(greeting["finished"], 30);
        assert_eq!(greeting["duration"], 30);
        assert_eq!(greeting["keypressCount"], 2);
        assert_eq!(greeting["correctionCount"], 0);
        assert_eq!(greeting["textLength"], 6);
        assert_eq!(greeting["hashData"], content_hash("hello"));

        let colors = &events[1];
        assert_eq!(colors["fieldNumber"], 2);
        assert_eq!(colors["openData"], "Red; Blue");
        assert_eq!(colors["started"], 45);

        assert_eq!(events[2]["eventType"], "form-submitted");
        assert_eq!(replay.tracker().watcher().current_location(), "https://shop.example/done");
    }

    #[test]
    fn test_update_for_unknown_control() {
        let fixture = PageFixture::from_json(FIXTURE).unwrap();
        let mut replay = Replay::new(
            TrackerConfig::new("px-1", "collect.example"),
            &fixture,
            Box::new(OfflineTransport::new()),
            0,
        )
        .unwrap();

        let step = ScriptStep {
            at: None,
            action: StepAction::Field {
                control: 7,
                event: DomEvent::Change,
                update: Some(ControlUpdate::default()),
            },
        };
        assert!(matches!(replay.step(&step), Err(TrackerError::UnknownControl(7))));
    }
}
