//! Device and page signals sent when a session is opened

pub mod page;
pub mod probe;

pub use page::{Environment, PageMetadata, Signals};
pub use probe::{
    recorded_bundle, FontProbe, OrientationProbe, ProbeBundle, ProbeKey, ProbeReadings, RecordedFonts,
    RecordedProbe, SignalProbe, SignalSource, StaticSignals,
};
