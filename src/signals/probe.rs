//! Fingerprint probe bundle
//!
//! Probes are independent collaborators that each fill one key of
//! [`ProbeReadings`]. The bundle runs the synchronous probes in registration order
//! and the font probe last, so the font probe observes every synchronous result.
//! Each probe writes into a scratch copy and only its own key is kept, so a
//! failing probe degrades only that key to `null`.

use crate::error::ProbeError;
use log::debug;
use serde::{Deserialize, Serialize};

/// Raw probe results. `None` serializes as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeReadings {
    pub plugins: Option<Vec<String>>,
    pub fonts: Option<Vec<String>>,
    pub canvas: Option<String>,
    pub webgl_vendor: Option<String>,
    pub orientation: Option<String>,
    pub adblock: Option<bool>,
    pub session_storage: Option<bool>,
    pub local_storage: Option<bool>,
    pub indexed_db: Option<bool>,
    pub open_database: Option<bool>,
}

/// Identifies one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKey {
    Plugins,
    Fonts,
    Canvas,
    WebglVendor,
    Orientation,
    Adblock,
    SessionStorage,
    LocalStorage,
    IndexedDb,
    OpenDatabase,
}

impl ProbeReadings {
    /// Reset one key to `null`
    pub fn reset(&mut self, key: ProbeKey) {
        match key {
            ProbeKey::Plugins => self.plugins = None,
            ProbeKey::Fonts => self.fonts = None,
            ProbeKey::Canvas => self.canvas = None,
            ProbeKey::WebglVendor => self.webgl_vendor = None,
            ProbeKey::Orientation => self.orientation = None,
            ProbeKey::Adblock => self.adblock = None,
            ProbeKey::SessionStorage => self.session_storage = None,
            ProbeKey::LocalStorage => self.local_storage = None,
            ProbeKey::IndexedDb => self.indexed_db = None,
            ProbeKey::OpenDatabase => self.open_database = None,
        }
    }

    /// Copy one key from `other`. Returns `false` when `other` has no reading for it.
    pub fn copy_key(&mut self, other: &ProbeReadings, key: ProbeKey) -> bool {
        macro_rules! copy {
            ($field:ident) => {{
                self.$field = other.$field.clone();
                self.$field.is_some()
            }};
        }
        match key {
            ProbeKey::Plugins => copy!(plugins),
            ProbeKey::Fonts => copy!(fonts),
            ProbeKey::Canvas => copy!(canvas),
            ProbeKey::WebglVendor => copy!(webgl_vendor),
            ProbeKey::Orientation => copy!(orientation),
            ProbeKey::Adblock => copy!(adblock),
            ProbeKey::SessionStorage => copy!(session_storage),
            ProbeKey::LocalStorage => copy!(local_storage),
            ProbeKey::IndexedDb => copy!(indexed_db),
            ProbeKey::OpenDatabase => copy!(open_database),
        }
    }
}

/// A synchronous probe filling one key
pub trait SignalProbe {
    fn key(&self) -> ProbeKey;
    fn probe(&self, readings: &mut ProbeReadings) -> Result<(), ProbeError>;
}

/// The deferred font availability probe
pub trait FontProbe {
    /// Detect available fonts. `readings` already holds every synchronous result.
    fn detect(&self, readings: &ProbeReadings) -> Result<Vec<String>, ProbeError>;
}

/// Anything that can produce one set of readings. Consumed by collection.
pub trait SignalSource {
    fn collect_signals(self: Box<Self>) -> ProbeReadings;
}

/// Registered probes, run once
#[derive(Default)]
pub struct ProbeBundle {
    probes: Vec<Box<dyn SignalProbe>>,
    fonts: Option<Box<dyn FontProbe>>,
}

impl ProbeBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(mut self, probe: impl SignalProbe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    pub fn with_font_probe(mut self, probe: impl FontProbe + 'static) -> Self {
        self.fonts = Some(Box::new(probe));
        self
    }

    pub fn len(&self) -> usize {
        self.probes.len() + usize::from(self.fonts.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SignalSource for ProbeBundle {
    fn collect_signals(self: Box<Self>) -> ProbeReadings {
        let mut readings = ProbeReadings::default();

        for probe in &self.probes {
            let key = probe.key();
            let mut scratch = readings.clone();
            match probe.probe(&mut scratch) {
                Ok(()) => {
                    readings.copy_key(&scratch, key);
                }
                Err(e) => {
                    debug!("probe {:?} failed: {}", key, e);
                    readings.reset(key);
                }
            }
        }

        if let Some(fonts) = &self.fonts {
            match fonts.detect(&readings) {
                Ok(found) => readings.fonts = Some(found),
                Err(e) => {
                    debug!("font probe failed: {}", e);
                    readings.reset(ProbeKey::Fonts);
                }
            }
        }

        readings
    }
}

/// Screen orientation from geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrientationProbe {
    pub screen_width: u32,
    pub screen_height: u32,
}

impl OrientationProbe {
    pub fn new(screen_width: u32, screen_height: u32) -> Self {
        Self {
            screen_width,
            screen_height,
        }
    }

    pub fn orientation(&self) -> &'static str {
        if self.screen_height > self.screen_width {
            "portrait"
        } else {
            "landscape"
        }
    }
}

impl SignalProbe for OrientationProbe {
    fn key(&self) -> ProbeKey {
        ProbeKey::Orientation
    }

    fn probe(&self, readings: &mut ProbeReadings) -> Result<(), ProbeError> {
        readings.orientation = Some(self.orientation().to_string());
        Ok(())
    }
}

/// Replays readings captured by a host for one key.
///
/// A missing reading counts as a probe failure.
#[derive(Debug, Clone)]
pub struct RecordedProbe {
    key: ProbeKey,
    recorded: ProbeReadings,
}

impl RecordedProbe {
    pub fn new(key: ProbeKey, recorded: ProbeReadings) -> Self {
        Self { key, recorded }
    }

    /// One probe per synchronous key; fonts go through [`RecordedFonts`]
    pub fn all(recorded: &ProbeReadings) -> Vec<RecordedProbe> {
        [
            ProbeKey::Plugins,
            ProbeKey::Canvas,
            ProbeKey::WebglVendor,
            ProbeKey::Orientation,
            ProbeKey::Adblock,
            ProbeKey::SessionStorage,
            ProbeKey::LocalStorage,
            ProbeKey::IndexedDb,
            ProbeKey::OpenDatabase,
        ]
        .into_iter()
        .map(|key| RecordedProbe::new(key, recorded.clone()))
        .collect()
    }
}

impl SignalProbe for RecordedProbe {
    fn key(&self) -> ProbeKey {
        self.key
    }

    fn probe(&self, readings: &mut ProbeReadings) -> Result<(), ProbeError> {
        if readings.copy_key(&self.recorded, self.key) {
            Ok(())
        } else {
            Err(ProbeError(format!("no recorded reading for {:?}", self.key)))
        }
    }
}

/// Replays a captured font list
#[derive(Debug, Clone, Default)]
pub struct RecordedFonts(pub Option<Vec<String>>);

impl FontProbe for RecordedFonts {
    fn detect(&self, _readings: &ProbeReadings) -> Result<Vec<String>, ProbeError> {
        self.0
            .clone()
            .ok_or_else(|| ProbeError("no recorded font list".to_string()))
    }
}

/// Fixed readings
#[derive(Debug, Clone, Default)]
pub struct StaticSignals(pub ProbeReadings);

impl SignalSource for StaticSignals {
    fn collect_signals(self: Box<Self>) -> ProbeReadings {
        self.0
    }
}

/// Bundle replaying a host capture: recorded probes plus an orientation probe
/// when the capture has no orientation reading.
pub fn recorded_bundle(recorded: &ProbeReadings, screen_width: u32, screen_height: u32) -> ProbeBundle {
    let mut bundle = ProbeBundle::new();
    for probe in RecordedProbe::all(recorded) {
        if probe.key() == ProbeKey::Orientation && recorded.orientation.is_none() {
            bundle = bundle.with_probe(OrientationProbe::new(screen_width, screen_height));
        } else {
            bundle = bundle.with_probe(probe);
        }
    }
    bundle.with_font_probe(RecordedFonts(recorded.fonts.clone()))
}
