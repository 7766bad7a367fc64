/// Spectrum frame produced for visualization
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Log-scaled magnitudes of one analysis window
///
/// Bin `i` covers `i * sample_rate / window_size` Hz. Values are in dB and
/// never fall below the analyzer's configured floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFrame {
    /// Magnitude per bin (dB), DC first
    pub magnitudes: Vec<f32>,

    /// Stream time of the first sample in the analysis window
    pub timestamp: Duration,

    /// Sample rate of the analyzed audio (Hz)
    pub sample_rate: u32,

    /// Analysis window length in samples
    pub window_size: usize,
}

impl SpectrumFrame {
    /// Number of bins
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    /// Check if the frame has no bins
    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Center frequency of a bin (Hz)
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        if self.window_size == 0 {
            return 0.0;
        }
        bin as f32 * self.sample_rate as f32 / self.window_size as f32
    }

    /// Bin nearest to a frequency
    pub fn bin_for_frequency(&self, frequency: f32) -> usize {
        if self.sample_rate == 0 || self.magnitudes.is_empty() {
            return 0;
        }
        let bin = (frequency * self.window_size as f32 / self.sample_rate as f32).round();
        (bin.max(0.0) as usize).min(self.magnitudes.len() - 1)
    }

    /// Magnitude (dB) at the bin nearest to a frequency
    pub fn magnitude_at(&self, frequency: f32) -> Option<f32> {
        if self.magnitudes.is_empty() {
            return None;
        }
        self.magnitudes.get(self.bin_for_frequency(frequency)).copied()
    }

    /// Peak magnitude (dB) over bins inside `[low_hz, high_hz]`
    pub fn peak_in_range(&self, low_hz: f32, high_hz: f32) -> Option<f32> {
        let start = self.bin_for_frequency(low_hz);
        let end = self.bin_for_frequency(high_hz);
        self.magnitudes
            .get(start..=end.max(start))
            .and_then(|bins| bins.iter().copied().reduce(f32::max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> SpectrumFrame {
        SpectrumFrame {
            magnitudes: (0..1025).map(|i| -(i as f32) / 10.0).collect(),
            timestamp: Duration::ZERO,
            sample_rate: 44_100,
            window_size: 2048,
        }
    }

    #[test]
    fn bin_frequency_mapping() {
        let frame = frame();
        assert_eq!(frame.bin_frequency(0), 0.0);
        assert!((frame.bin_frequency(1024) - 22_050.0).abs() < 1e-3);
        assert_eq!(frame.bin_for_frequency(1000.0), 46);
        assert_eq!(frame.bin_for_frequency(1e9), 1024);
    }

    #[test]
    fn peak_in_range_takes_maximum() {
        let frame = frame();
        let peak = frame.peak_in_range(100.0, 1000.0).unwrap();
        assert_eq!(peak, frame.magnitudes[frame.bin_for_frequency(100.0)]);
    }
}
