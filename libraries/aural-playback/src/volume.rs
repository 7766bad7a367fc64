//! Output volume
//!
//! Level 0-100 maps onto -60 dB..0 dB, so equal steps sound like equal
//! changes. The gain is applied to each block before it is queued, followed
//! by a hard clip to [-1.0, 1.0] so EQ boosts never reach the device as
//! out-of-range samples.

use aural_core::AudioBlock;

/// Lowest level above silence, in dB
const FLOOR_DB: f32 = -60.0;

/// Volume controller with logarithmic scaling
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    level: u8,
    muted: bool,
    linear_gain: f32,
}

impl Volume {
    /// Create a controller at `level` (clamped to 100)
    pub fn new(level: u8) -> Self {
        let level = level.min(100);
        Self {
            level,
            muted: false,
            linear_gain: Self::calculate_linear_gain(level),
        }
    }

    /// Set volume level (0-100)
    pub fn set_level(&mut self, level: u8) {
        self.level = level.min(100);
        self.linear_gain = Self::calculate_linear_gain(self.level);
    }

    /// Current volume level (0-100)
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Mute or unmute, keeping the level
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Check if muted
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Linear gain multiplier, 0.0 when muted
    pub fn gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.linear_gain
        }
    }

    /// Scale a block and clip it to the legal sample range
    pub fn process(&self, mut block: AudioBlock) -> AudioBlock {
        self.apply(&mut block.samples);
        block
    }

    /// Scale and clip samples in place
    pub fn apply(&self, samples: &mut [f32]) {
        let gain = self.gain();
        if gain == 0.0 {
            samples.fill(0.0);
            return;
        }
        for sample in samples.iter_mut() {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }
    }

    /// Current gain in dB (-60 when silent)
    pub fn to_db(&self) -> f32 {
        if self.level == 0 || self.muted {
            FLOOR_DB
        } else {
            20.0 * self.linear_gain.log10()
        }
    }

    /// `10^((level - 100) * 0.6 / 20)`: 50% is -30 dB, 100% is unity
    fn calculate_linear_gain(level: u8) -> f32 {
        if level == 0 {
            return 0.0;
        }
        let db = (f32::from(level) - 100.0) * (-FLOOR_DB / 100.0);
        10.0_f32.powf(db / 20.0)
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(50)
    }
}
