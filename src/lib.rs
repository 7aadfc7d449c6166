//! Formsense - behavioral telemetry for a single web form
//!
//! Formsense instruments one form on a page and turns DOM-level events into
//! collector records: per-field interaction timing, keystroke and correction
//! counts, a content hash, and a device/browser fingerprint sent once when the
//! session is opened.
//!
//! ## Modules
//!
//! - **Field tracking**: one state machine per control, numbered by tab order
//! - **Submission**: exactly one form-submitted record per guard window
//! - **Session**: cookie-backed, server-provisioned session identity
//! - **Signals**: fingerprint probe bundle and page metadata
//! - **Transport**: JSON POSTs to the collector through a bounded dispatch queue
//!
//! The host owns the page: it describes the form, feeds events to a [`Tracker`]
//! and calls [`Tracker::pump`] on its idle tick.

pub mod clock;
pub mod config;
pub mod error;
pub mod field;
pub mod form;
pub mod navigation;
pub mod record;
pub mod script;
pub mod session;
pub mod signals;
pub mod submission;
pub mod tracker;
pub mod transport;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use config::{EmbedConfig, TrackerConfig};
pub use error::{ProbeError, TrackerError, TransportError};
pub use field::{content_hash, FieldOutcome, FieldStateMachine};
pub use form::{Control, ControlId, ControlUpdate, DomEvent, Form};
pub use record::{EventRecord, EventType};
pub use session::{CookieJar, DocumentCookieJar, SessionManager, SessionState};
pub use signals::{ProbeBundle, ProbeReadings, SignalProbe, SignalSource, Signals};
pub use submission::{SubmissionWatcher, SubmitSignal};
pub use tracker::{Host, Tracker};
pub use transport::{HttpTransport, OfflineTransport, SendMode, Transport};

/// Formsense version
pub const FORMSENSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "formsense";
