//! Per-control interaction state machine
//!
//! `Idle -> Started -> Finalized`. A focus, keystroke or paste on a finalized
//! control opens a new interaction with a fresh record; end triggers on a
//! finalized control are ignored, so Enter followed by blur yields one record.
//!
//! `finished` is the finalize time, clamped to `started` when the clock moved
//! backwards during the interaction, so `duration` is never negative.

use crate::clock::Millis;
use crate::field::keys::{classify_key, finalizes_on_enter, tracks_keystrokes, EndTrigger, KeyClass, ENTER_KEY};
use crate::field::value::{content_hash, text_length};
use crate::form::{Control, ControlId, DomEvent};
use crate::record::{EventRecord, EventType, FieldSnapshot};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPhase {
    Idle,
    Started,
    Finalized,
}

/// Result of feeding one event to a state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    /// The event does not apply to this control or state
    Ignored,
    /// Timing or counters changed
    Updated,
    /// The interaction ended; the record is ready to send
    Finalized(EventRecord),
}

/// Tracks one control from first focus to its end trigger
#[derive(Debug, Clone)]
pub struct FieldStateMachine {
    id: ControlId,
    field_number: usize,
    control_type: String,
    end_trigger: EndTrigger,
    session: Option<String>,
    phase: FieldPhase,
    record: EventRecord,
    interactions: u32,
}

impl FieldStateMachine {
    pub fn new(id: ControlId, control: &Control, field_number: usize, session: Option<String>) -> Self {
        let control_type = control.kind();
        Self {
            id,
            field_number,
            end_trigger: EndTrigger::for_type(&control_type),
            control_type,
            record: EventRecord::new(EventType::FieldFilled, session.clone()),
            session,
            phase: FieldPhase::Idle,
            interactions: 0,
        }
    }

    pub fn id(&self) -> ControlId {
        self.id
    }

    pub fn field_number(&self) -> usize {
        self.field_number
    }

    pub fn end_trigger(&self) -> EndTrigger {
        self.end_trigger
    }

    pub fn phase(&self) -> FieldPhase {
        self.phase
    }

    /// The record of the current (or last finalized) interaction
    pub fn record(&self) -> &EventRecord {
        &self.record
    }

    /// Number of finalized interactions so far
    pub fn interactions(&self) -> u32 {
        self.interactions
    }

    /// Feed one DOM event. `control` is the control's state at the time of the event.
    pub fn handle(
        &mut self,
        event: &DomEvent,
        control: &Control,
        now: Millis,
        no_raw_data: bool,
    ) -> FieldOutcome {
        match event {
            DomEvent::Focus => self.focus(now),
            DomEvent::Keydown { key } => {
                let mut outcome = FieldOutcome::Ignored;
                if tracks_keystrokes(&self.control_type) {
                    self.reopen_if_finalized(now);
                    self.count_key(key);
                    outcome = FieldOutcome::Updated;
                }
                if key == ENTER_KEY && finalizes_on_enter(&self.control_type) {
                    if let Some(record) = self.finalize(control, now, no_raw_data) {
                        outcome = FieldOutcome::Finalized(record);
                    }
                }
                outcome
            }
            DomEvent::Paste => {
                if !tracks_keystrokes(&self.control_type) {
                    return FieldOutcome::Ignored;
                }
                self.reopen_if_finalized(now);
                self.record.from_clipboard = true;
                FieldOutcome::Updated
            }
            other if self.end_trigger.matches(other) => match self.finalize(control, now, no_raw_data) {
                Some(record) => FieldOutcome::Finalized(record),
                None => FieldOutcome::Ignored,
            },
            _ => FieldOutcome::Ignored,
        }
    }

    fn focus(&mut self, now: Millis) -> FieldOutcome {
        match self.phase {
            FieldPhase::Started => FieldOutcome::Ignored,
            FieldPhase::Finalized => {
                self.reopen_if_finalized(now);
                FieldOutcome::Updated
            }
            FieldPhase::Idle => {
                if self.record.started.is_none() {
                    self.record.started = Some(now);
                }
                self.phase = FieldPhase::Started;
                FieldOutcome::Updated
            }
        }
    }

    fn reopen_if_finalized(&mut self, now: Millis) {
        if self.phase != FieldPhase::Finalized {
            return;
        }
        debug!("field {} reopened", self.field_number);
        self.record = EventRecord::new(EventType::FieldFilled, self.session.clone());
        self.record.started = Some(now);
        self.phase = FieldPhase::Started;
    }

    fn count_key(&mut self, key: &str) {
        match classify_key(key) {
            KeyClass::Correction => self.record.correction_count += 1,
            KeyClass::Special => self.record.special_keypress_count += 1,
            KeyClass::Ordinary => {}
        }
        self.record.keypress_count += 1;
    }

    fn finalize(&mut self, control: &Control, now: Millis, no_raw_data: bool) -> Option<EventRecord> {
        if self.phase == FieldPhase::Finalized {
            debug!("field {} already finalized, ignoring end trigger", self.field_number);
            return None;
        }

        let started = *self.record.started.get_or_insert(now);
        let finished = now.max(started);
        if finished != now {
            debug!(
                "field {} clock went back {} ms, finished clamped to started",
                self.field_number,
                started - now
            );
        }
        let value = control.current_value();

        let record = &mut self.record;
        record.finished = Some(finished);
        record.duration = finished - started;
        record.field = Some(FieldSnapshot::capture(control, self.field_number));
        record.text_length = text_length(&value);
        record.hash_data = Some(content_hash(&value));
        record.open_data = if no_raw_data { None } else { Some(value) };

        self.phase = FieldPhase::Finalized;
        self.interactions += 1;
        debug!(
            "field {} finalized after {} ms ({} keypresses)",
            self.field_number, record.duration, record.keypress_count
        );
        Some(record.clone())
    }
}
