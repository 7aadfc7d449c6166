//! Form submission detection
//!
//! Three independent signals mark the end of the form's life: the native submit
//! event, the window's before-unload event and a history push. Whichever arrives
//! first emits the `form-submitted` record; the others are swallowed until the
//! send completes and the guard is released.

use crate::clock::Millis;
use crate::record::{EventRecord, EventType};
use log::debug;
use serde::{Deserialize, Serialize};

/// A submit-equivalent signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitSignal {
    NativeSubmit,
    BeforeUnload,
    HistoryPush,
}

/// Watches one form for submit-equivalent signals
#[derive(Debug, Clone)]
pub struct SubmissionWatcher {
    submit_in_progress: bool,
    current_location: String,
    emitted: u32,
}

impl SubmissionWatcher {
    pub fn new(location: &str) -> Self {
        Self {
            submit_in_progress: false,
            current_location: location.to_string(),
            emitted: 0,
        }
    }

    pub fn submit_in_progress(&self) -> bool {
        self.submit_in_progress
    }

    pub fn current_location(&self) -> &str {
        &self.current_location
    }

    /// Number of form-submitted records emitted so far
    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    /// Record a location change reported by a history push
    pub fn set_location(&mut self, location: &str) {
        self.current_location = location.to_string();
    }

    /// Handle a signal. Returns the record to send, or `None` while a send is in progress.
    pub fn on_signal(
        &mut self,
        signal: SubmitSignal,
        session: Option<String>,
        now: Millis,
    ) -> Option<EventRecord> {
        if self.submit_in_progress {
            debug!("submit already in progress, ignoring {:?}", signal);
            return None;
        }
        self.submit_in_progress = true;
        self.emitted += 1;
        debug!("form submitted via {:?}", signal);

        let mut record = EventRecord::new(EventType::FormSubmitted, session);
        record.started = Some(now);
        record.finished = Some(now);
        record.duration = 0;
        Some(record)
    }

    /// Clear the guard once the form-submitted send has completed
    pub fn release(&mut self) {
        self.submit_in_progress = false;
    }
}
