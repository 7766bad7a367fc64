//! 10-band graphic equalizer
//!
//! Ten RBJ peaking biquads at the ISO octave centers, run in series on every
//! channel. Gain changes are queued through an [`EqualizerHandle`] and picked
//! up only when the next block starts, so a block is always filtered with one
//! consistent set of coefficients.

use crate::error::{AudioError, Result};
use aural_core::{AudioBlock, EqualizerPreset, BAND_COUNT, BAND_FREQUENCIES, MAX_GAIN_DB, MIN_GAIN_DB};
use crossbeam_channel::{Receiver, Sender};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Quality factor shared by every band
pub const BAND_Q: f32 = 1.0;

/// Gains closer to 0 dB than this bypass the band entirely
const BYPASS_THRESHOLD_DB: f32 = 0.01;

/// Filter outputs below this magnitude are flushed to zero
const DENORMAL_THRESHOLD: f32 = 1e-15;

/// A queued gain change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EqUpdate {
    /// Change one band
    Band {
        /// Band index, 0 = 31.5 Hz
        index: usize,
        /// New gain (dB), already clamped
        gain_db: f32,
    },
    /// Replace all ten gains together
    All([f32; BAND_COUNT]),
}

/// Thread-safe control surface for a [`GraphicEq`]
///
/// Cloneable and `Send`. Updates go onto a queue the equalizer drains at the
/// start of its next block; target gains are mirrored in atomics so any
/// thread can read them back without waiting for audio to flow.
#[derive(Clone)]
pub struct EqualizerHandle {
    sender: Sender<EqUpdate>,
    targets: Arc<[AtomicU32; BAND_COUNT]>,
}

impl EqualizerHandle {
    /// Queue a new gain for one band
    ///
    /// The gain is clamped to ±12 dB; the clamped value is returned.
    ///
    /// # Errors
    /// `InvalidBand` for an index outside `0..10`, `InvalidGain` for NaN or infinity.
    pub fn set_band_gain(&self, index: usize, gain_db: f32) -> Result<f32> {
        if index >= BAND_COUNT {
            return Err(AudioError::InvalidBand(index));
        }
        if !gain_db.is_finite() {
            return Err(AudioError::InvalidGain(gain_db));
        }

        let gain_db = gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        self.targets[index].store(gain_db.to_bits(), Ordering::Release);
        self.send(EqUpdate::Band { index, gain_db });
        Ok(gain_db)
    }

    /// Queue a whole preset; all ten bands switch on the same block
    pub fn load_preset(&self, preset: &EqualizerPreset) {
        let gains = *preset.gains();
        for (target, gain) in self.targets.iter().zip(gains) {
            target.store(gain.to_bits(), Ordering::Release);
        }
        self.send(EqUpdate::All(gains));
    }

    /// Validate and queue an arbitrary gain vector
    ///
    /// # Errors
    /// `InvalidPreset` unless there are exactly ten finite in-range gains.
    pub fn set_gains(&self, gains: &[f32]) -> Result<()> {
        let preset = EqualizerPreset::new("Custom", gains)
            .map_err(|e| AudioError::InvalidPreset(e.to_string()))?;
        self.load_preset(&preset);
        Ok(())
    }

    /// Most recently requested gains, whether or not they have been applied yet
    pub fn gains(&self) -> [f32; BAND_COUNT] {
        std::array::from_fn(|i| f32::from_bits(self.targets[i].load(Ordering::Acquire)))
    }

    fn send(&self, update: EqUpdate) {
        // The equalizer may already be gone during teardown
        if self.sender.send(update).is_err() {
            debug!("Equalizer dropped, update discarded");
        }
    }
}

impl std::fmt::Debug for EqualizerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EqualizerHandle")
            .field("gains", &self.gains())
            .finish()
    }
}

/// Normalized biquad coefficients (a0 = 1)
#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// RBJ cookbook peaking filter
    fn peaking(frequency: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        if sample_rate < 1.0 {
            return Self::IDENTITY;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        // Keep the center well clear of Nyquist at low sample rates
        let frequency = frequency.min(sample_rate * 0.45);
        let omega = 2.0 * PI * frequency / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_omega) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_omega) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }
}

/// One band's configuration
#[derive(Debug, Clone, Copy)]
struct BiquadBand {
    frequency: f32,
    gain_db: f32,
    coefficients: Coefficients,
    bypassed: bool,
}

impl BiquadBand {
    fn new(frequency: f32) -> Self {
        Self {
            frequency,
            gain_db: 0.0,
            coefficients: Coefficients::IDENTITY,
            bypassed: true,
        }
    }

    fn update(&mut self, gain_db: f32, sample_rate: u32) {
        self.gain_db = gain_db;
        self.bypassed = gain_db.abs() < BYPASS_THRESHOLD_DB;
        self.coefficients = if self.bypassed {
            Coefficients::IDENTITY
        } else {
            Coefficients::peaking(self.frequency, gain_db, BAND_Q, sample_rate as f32)
        };
    }
}

/// Delay line of one band on one channel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct FilterState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl FilterState {
    #[inline]
    fn process(&mut self, c: &Coefficients, bypassed: bool, input: f32) -> f32 {
        let output = if bypassed {
            input
        } else {
            let y = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
            if y.abs() < DENORMAL_THRESHOLD {
                0.0
            } else {
                y
            }
        };

        // History keeps running through bypassed bands so re-enabling one is seamless
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// 10-band graphic equalizer
pub struct GraphicEq {
    bands: [BiquadBand; BAND_COUNT],
    /// One delay line per band, per channel
    state: Vec<[FilterState; BAND_COUNT]>,
    sample_rate: u32,
    channels: u16,
    updates: Receiver<EqUpdate>,
    handle: EqualizerHandle,
}

impl GraphicEq {
    /// Create a flat equalizer for the given stream format
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let (sender, updates) = crossbeam_channel::unbounded();
        let targets = Arc::new(std::array::from_fn(|_| AtomicU32::new(0.0_f32.to_bits())));

        Self {
            bands: BAND_FREQUENCIES.map(BiquadBand::new),
            state: vec![[FilterState::default(); BAND_COUNT]; usize::from(channels)],
            sample_rate,
            channels,
            updates,
            handle: EqualizerHandle { sender, targets },
        }
    }

    /// A handle other threads can use to change gains
    pub fn handle(&self) -> EqualizerHandle {
        self.handle.clone()
    }

    /// Queue a gain change for the next block (see [`EqualizerHandle::set_band_gain`])
    pub fn set_band_gain(&self, index: usize, gain_db: f32) -> Result<f32> {
        self.handle.set_band_gain(index, gain_db)
    }

    /// Queue a preset for the next block
    pub fn load_preset(&self, preset: &EqualizerPreset) {
        self.handle.load_preset(preset);
    }

    /// Gains currently in effect (dB)
    pub fn gains(&self) -> [f32; BAND_COUNT] {
        self.bands.map(|band| band.gain_db)
    }

    /// Center frequency of a band
    pub fn band_frequency(&self, index: usize) -> Option<f32> {
        self.bands.get(index).map(|band| band.frequency)
    }

    /// Whether every band is bypassed
    pub fn is_flat(&self) -> bool {
        self.bands.iter().all(|band| band.bypassed)
    }

    /// Switch stream format and clear all filter history
    pub fn configure(&mut self, sample_rate: u32, channels: u16) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            for band in &mut self.bands {
                band.update(band.gain_db, sample_rate);
            }
        }
        self.channels = channels;
        self.state = vec![[FilterState::default(); BAND_COUNT]; usize::from(channels)];
        debug!(sample_rate, channels, "equalizer configured");
    }

    /// Clear filter history (track change)
    pub fn reset(&mut self) {
        for channel in &mut self.state {
            *channel = [FilterState::default(); BAND_COUNT];
        }
    }

    /// Filter one block through the cascade
    ///
    /// Queued gain changes are applied before the first sample; nothing that
    /// arrives while the block is being filtered affects it.
    pub fn apply(&mut self, mut block: AudioBlock) -> AudioBlock {
        self.apply_pending_updates();

        if block.sample_rate != self.sample_rate || block.channels != self.channels {
            self.configure(block.sample_rate, block.channels);
        }

        if self.is_flat() {
            // Keep history current without touching the samples
            self.track_history(&block.samples);
            return block;
        }

        let channels = usize::from(self.channels.max(1));
        for frame in block.samples.chunks_exact_mut(channels) {
            for (sample, state) in frame.iter_mut().zip(self.state.iter_mut()) {
                let mut value = *sample;
                for (band, band_state) in self.bands.iter().zip(state.iter_mut()) {
                    value = band_state.process(&band.coefficients, band.bypassed, value);
                }
                *sample = value;
            }
        }

        block
    }

    /// Drain the update queue; returns whether anything changed
    fn apply_pending_updates(&mut self) -> bool {
        let mut changed = false;
        for update in self.updates.try_iter() {
            match update {
                EqUpdate::Band { index, gain_db } => {
                    if let Some(band) = self.bands.get_mut(index) {
                        band.update(gain_db, self.sample_rate);
                        changed = true;
                    }
                }
                EqUpdate::All(gains) => {
                    for (band, gain) in self.bands.iter_mut().zip(gains) {
                        band.update(gain, self.sample_rate);
                    }
                    changed = true;
                }
            }
        }
        if changed {
            debug!(gains = ?self.gains(), "equalizer gains updated");
        }
        changed
    }

    fn track_history(&mut self, samples: &[f32]) {
        let channels = usize::from(self.channels.max(1));
        for frame in samples.chunks_exact(channels) {
            for (&sample, state) in frame.iter().zip(self.state.iter_mut()) {
                for band_state in state.iter_mut() {
                    band_state.process(&Coefficients::IDENTITY, true, sample);
                }
            }
        }
    }
}

impl std::fmt::Debug for GraphicEq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicEq")
            .field("gains", &self.gains())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::tests::generate_sine;

    fn block(samples: Vec<f32>, offset: u64) -> AudioBlock {
        AudioBlock::new(samples, 44_100, 2, offset)
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn band_frequencies() {
        let eq = GraphicEq::new(44_100, 2);
        assert_eq!(eq.band_frequency(0), Some(31.5));
        assert_eq!(eq.band_frequency(5), Some(1000.0));
        assert_eq!(eq.band_frequency(9), Some(16000.0));
        assert_eq!(eq.band_frequency(10), None);
    }

    #[test]
    fn gain_clamping_and_validation() {
        let eq = GraphicEq::new(44_100, 2);
        assert_eq!(eq.set_band_gain(0, 20.0).unwrap(), 12.0);
        assert_eq!(eq.set_band_gain(0, -20.0).unwrap(), -12.0);
        assert!(matches!(eq.set_band_gain(10, 3.0), Err(AudioError::InvalidBand(10))));
        assert!(matches!(eq.set_band_gain(2, f32::NAN), Err(AudioError::InvalidGain(_))));
        assert_eq!(eq.handle().gains()[0], -12.0);
    }

    #[test]
    fn flat_is_exact_identity() {
        let mut eq = GraphicEq::new(44_100, 2);
        let input = generate_sine(440.0, 44_100, 0.05);
        let output = eq.apply(block(input.clone(), 0));
        assert_eq!(output.samples, input);
    }

    #[test]
    fn updates_wait_for_block_boundary() {
        let mut eq = GraphicEq::new(44_100, 2);
        let handle = eq.handle();

        let first = generate_sine(63.0, 44_100, 0.05);
        handle.set_band_gain(1, 12.0).unwrap();
        // Requested, not yet in effect
        assert_eq!(eq.gains()[1], 0.0);
        assert_eq!(handle.gains()[1], 12.0);

        let boosted = eq.apply(block(first.clone(), 0));
        assert_eq!(eq.gains()[1], 12.0);
        assert!(rms(&boosted.samples) > rms(&first) * 1.5);
    }

    #[test]
    fn change_does_not_touch_committed_block() {
        let signal = generate_sine(125.0, 44_100, 0.1);
        let (a, b) = signal.split_at(signal.len() / 2);

        let mut reference = GraphicEq::new(44_100, 2);
        let ref_first = reference.apply(block(a.to_vec(), 0));

        let mut eq = GraphicEq::new(44_100, 2);
        let first = eq.apply(block(a.to_vec(), 0));
        eq.set_band_gain(2, 9.0).unwrap();
        let second = eq.apply(block(b.to_vec(), 2205));

        assert_eq!(first.samples, ref_first.samples);
        assert_ne!(second.samples, b.to_vec());
    }

    #[test]
    fn preset_switches_all_bands_together() {
        let mut eq = GraphicEq::new(44_100, 2);
        let rock = EqualizerPreset::builtin("Rock").unwrap();
        eq.load_preset(&rock);
        eq.apply(block(vec![0.0; 64], 0));
        assert_eq!(&eq.gains(), rock.gains());
    }

    #[test]
    fn boost_and_cut_around_center() {
        let sine = generate_sine(1000.0, 44_100, 0.5);

        let mut boost = GraphicEq::new(44_100, 2);
        boost.set_band_gain(5, 6.0).unwrap();
        let boosted = boost.apply(block(sine.clone(), 0));

        let mut cut = GraphicEq::new(44_100, 2);
        cut.set_band_gain(5, -6.0).unwrap();
        let cutted = cut.apply(block(sine.clone(), 0));

        // Skip the filter's settling time
        let settled = 4410 * 2;
        let gain_up = 20.0 * (rms(&boosted.samples[settled..]) / rms(&sine[settled..])).log10();
        let gain_down = 20.0 * (rms(&cutted.samples[settled..]) / rms(&sine[settled..])).log10();
        assert!((gain_up - 6.0).abs() < 0.5, "boost measured {gain_up} dB");
        assert!((gain_down + 6.0).abs() < 0.5, "cut measured {gain_down} dB");
    }

    #[test]
    fn state_survives_gain_change_but_not_reset() {
        let sine = generate_sine(250.0, 44_100, 0.02);
        let mut eq = GraphicEq::new(44_100, 2);
        eq.set_band_gain(3, 6.0).unwrap();
        eq.apply(block(sine.clone(), 0));
        assert!(eq.state[0][3] != FilterState::default());

        eq.set_band_gain(3, 3.0).unwrap();
        eq.apply(block(vec![0.1; 4], 882));
        assert!(eq.state[0][3] != FilterState::default());

        eq.reset();
        assert!(eq.state.iter().all(|ch| ch.iter().all(|s| *s == FilterState::default())));
    }

    #[test]
    fn sample_rate_change_reconfigures() {
        let mut eq = GraphicEq::new(44_100, 2);
        eq.set_band_gain(9, 6.0).unwrap();
        eq.apply(block(vec![0.2; 64], 0));

        let out = eq.apply(AudioBlock::new(vec![0.2; 96], 48_000, 1, 0));
        assert_eq!(eq.sample_rate, 48_000);
        assert_eq!(eq.state.len(), 1);
        assert!(out.samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn stable_at_low_sample_rate() {
        // 16 kHz band is above Nyquist at 22.05 kHz; it must be clamped, not blow up
        let mut eq = GraphicEq::new(22_050, 2);
        eq.set_band_gain(9, 12.0).unwrap();
        let noise: Vec<f32> = (0..4410).map(|i| ((i * 7919) % 200) as f32 / 100.0 - 1.0).collect();
        let out = eq.apply(AudioBlock::new(noise, 22_050, 2, 0));
        assert!(out.samples.iter().all(|s| s.is_finite() && s.abs() < 10.0));
    }
}
