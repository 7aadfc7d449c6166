//! Field interaction capture
//!
//! Turns DOM-level events on a single control into one `field-filled` record per
//! interaction: focus starts it, keystrokes and pastes update its counters, and a
//! type-dependent end trigger finalizes it.

pub mod keys;
pub mod machine;
pub mod ordering;
pub mod value;

pub use keys::{classify_key, EndTrigger, KeyClass};
pub use machine::{FieldOutcome, FieldPhase, FieldStateMachine};
pub use ordering::{number_controls, order_key, NumberedControl, UNSET_TAB_INDEX};
pub use value::{content_hash, normalize_value};
