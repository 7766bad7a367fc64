//! Equalizer band layout and presets
//!
//! The band layout is fixed: ten octave-spaced peaking bands. Only the gain
//! of each band is user-mutable. A preset is a named, ordered vector of ten
//! gains that is validated whenever it crosses into the engine.

use crate::error::{AuralError, Result};
use serde::{Deserialize, Serialize};

/// Number of equalizer bands
pub const BAND_COUNT: usize = 10;

/// ISO octave center frequencies (Hz)
pub const BAND_FREQUENCIES: [f32; BAND_COUNT] = [
    31.5, 63.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Lowest band gain (dB)
pub const MIN_GAIN_DB: f32 = -12.0;

/// Highest band gain (dB)
pub const MAX_GAIN_DB: f32 = 12.0;

const BUILTIN_PRESETS: [(&str, [f32; BAND_COUNT]); 8] = [
    ("Flat", [0.0; BAND_COUNT]),
    ("Rock", [6.0, 6.0, 0.0, 0.0, 0.0, 0.0, 0.0, 6.0, 0.0, 0.0]),
    ("Bass Boost", [6.0, 5.0, 4.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("Treble Boost", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 4.0, 5.0, 6.0]),
    ("V-Shape", [5.0, 4.0, 2.0, -1.0, -2.0, -2.0, -1.0, 2.0, 4.0, 5.0]),
    ("Vocal", [-2.0, -1.0, 0.0, 2.0, 4.0, 4.0, 2.0, 0.0, -1.0, -2.0]),
    ("Electronic", [5.0, 4.0, 2.0, 0.0, 1.0, 2.0, 1.0, 3.0, 4.0, 4.0]),
    ("Acoustic", [2.0, 1.0, 0.0, 1.0, 2.0, 2.0, 1.0, 2.0, 2.0, 1.0]),
];

/// A named set of ten band gains
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EqualizerPreset {
    name: String,
    gains: [f32; BAND_COUNT],
}

/// Unvalidated wire shape, as handed over by a storage collaborator
#[derive(Deserialize)]
struct RawPreset {
    name: String,
    gains: Vec<f32>,
}

impl EqualizerPreset {
    /// Build a preset, rejecting anything that is not exactly ten in-range gains
    pub fn new(name: impl Into<String>, gains: &[f32]) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AuralError::invalid_input("preset name is empty"));
        }

        let gains: [f32; BAND_COUNT] = gains.try_into().map_err(|_| {
            AuralError::invalid_input(format!(
                "preset '{}' has {} gains, expected {}",
                name,
                gains.len(),
                BAND_COUNT
            ))
        })?;

        for (band, gain) in gains.iter().enumerate() {
            if !gain.is_finite() || !(MIN_GAIN_DB..=MAX_GAIN_DB).contains(gain) {
                return Err(AuralError::invalid_input(format!(
                    "preset '{}' band {} gain {} dB is outside {}..{} dB",
                    name, band, gain, MIN_GAIN_DB, MAX_GAIN_DB
                )));
            }
        }

        Ok(Self { name, gains })
    }

    /// All bands at 0 dB
    pub fn flat() -> Self {
        Self {
            name: "Flat".to_string(),
            gains: [0.0; BAND_COUNT],
        }
    }

    /// Look up a built-in preset by name (case-insensitive)
    pub fn builtin(name: &str) -> Option<Self> {
        BUILTIN_PRESETS
            .iter()
            .find(|(preset_name, _)| preset_name.eq_ignore_ascii_case(name.trim()))
            .map(|(preset_name, gains)| Self {
                name: (*preset_name).to_string(),
                gains: *gains,
            })
    }

    /// All built-in presets in display order
    pub fn builtins() -> Vec<Self> {
        BUILTIN_PRESETS
            .iter()
            .map(|(name, gains)| Self {
                name: (*name).to_string(),
                gains: *gains,
            })
            .collect()
    }

    /// Parse and validate a preset serialized as JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawPreset = serde_json::from_str(json)?;
        Self::new(raw.name, &raw.gains)
    }

    /// Serialize to JSON for a storage collaborator
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Preset name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Band gains in dB, lowest band first
    pub fn gains(&self) -> &[f32; BAND_COUNT] {
        &self.gains
    }

    /// Whether every band is at 0 dB
    pub fn is_flat(&self) -> bool {
        self.gains.iter().all(|g| *g == 0.0)
    }
}

impl<'de> Deserialize<'de> for EqualizerPreset {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawPreset::deserialize(deserializer)?;
        Self::new(raw.name, &raw.gains).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn band_frequencies_ascending() {
        for window in BAND_FREQUENCIES.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn rock_boosts_bass_and_presence() {
        let rock = EqualizerPreset::builtin("ROCK").unwrap();
        assert_eq!(rock.name(), "Rock");
        assert_eq!(rock.gains()[0], 6.0);
        assert_eq!(rock.gains()[1], 6.0);
        assert_eq!(rock.gains()[7], 6.0);
        assert_eq!(rock.gains()[5], 0.0);
    }

    #[test]
    fn unknown_builtin() {
        assert!(EqualizerPreset::builtin("Polka").is_none());
    }

    #[test]
    fn rejects_wrong_band_count() {
        let err = EqualizerPreset::new("Short", &[0.0; 9]).unwrap_err();
        assert!(err.to_string().contains("expected 10"));
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        let mut gains = [0.0; BAND_COUNT];
        gains[3] = 12.5;
        assert!(EqualizerPreset::new("Loud", &gains).is_err());

        gains[3] = f32::NAN;
        assert!(EqualizerPreset::new("Broken", &gains).is_err());
    }

    #[test]
    fn json_roundtrip_validates() {
        let json = r#"{"name":"Mine","gains":[1,2,3,4,5,6,7,8,9,10]}"#;
        let preset = EqualizerPreset::from_json(json).unwrap();
        assert_eq!(preset.gains()[9], 10.0);

        let restored = EqualizerPreset::from_json(&preset.to_json().unwrap()).unwrap();
        assert_eq!(restored, preset);

        let bad = r#"{"name":"Bad","gains":[1,2,3]}"#;
        assert!(EqualizerPreset::from_json(bad).is_err());
        assert!(serde_json::from_str::<EqualizerPreset>(bad).is_err());
    }

    #[test]
    fn builtins_are_all_valid() {
        for preset in EqualizerPreset::builtins() {
            assert!(EqualizerPreset::new(preset.name(), preset.gains()).is_ok());
        }
        assert!(EqualizerPreset::flat().is_flat());
    }

    proptest! {
        #[test]
        fn in_range_gains_always_accepted(gains in proptest::collection::vec(-12.0f32..=12.0, 10)) {
            prop_assert!(EqualizerPreset::new("Any", &gains).is_ok());
        }
    }
}
