//! Sample rate conversion
//!
//! Used by the output stage when a device runs at a different rate than the
//! decoded stream. Backed by rubato: polynomial interpolation for `Fast`,
//! windowed sinc for the other presets.
//!
//! ```rust
//! use aural_audio::{Resampler, ResamplingQuality};
//!
//! let mut resampler = Resampler::new(44_100, 48_000, 2, ResamplingQuality::Fast).unwrap();
//! let output = resampler.process(&vec![0.0; 4096]).unwrap();
//! assert_eq!(output.len() % 2, 0);
//! ```

use crate::error::{AudioError, Result};
use rubato::{
    FastFixedIn, PolynomialDegree, Resampler as RubatoResamplerTrait, SincFixedIn,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Resampling quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingQuality {
    /// Linear polynomial interpolation, lowest latency
    #[default]
    Fast,
    /// Short sinc filter
    Balanced,
    /// Long sinc filter
    High,
}

/// Input kept beyond two rubato chunks without reallocating
const INPUT_HEADROOM_FRAMES: usize = 8192;

impl ResamplingQuality {
    /// Frames consumed per rubato call
    fn chunk_size(self) -> usize {
        match self {
            Self::Fast | Self::Balanced => 1024,
            Self::High => 2048,
        }
    }

    fn sinc_params(self) -> SincInterpolationParameters {
        match self {
            Self::Fast | Self::Balanced => SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris,
            },
            Self::High => SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.99,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 512,
                window: WindowFunction::BlackmanHarris,
            },
        }
    }
}

enum Backend {
    /// Rates match, samples pass through untouched
    Passthrough,
    Fast(FastFixedIn<f32>),
    Sinc(SincFixedIn<f32>),
}

/// Streaming resampler over interleaved samples
///
/// Input that does not fill a whole rubato chunk is kept until the next call,
/// so output is continuous across calls. Working buffers are sized at
/// construction; [`process_into`](Self::process_into) does not allocate as
/// long as the caller's output queue has room.
pub struct Resampler {
    backend: Backend,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    input_buffer: VecDeque<f32>,
    planar_in: Vec<Vec<f32>>,
    planar_out: Vec<Vec<f32>>,
}

impl Resampler {
    /// Create a resampler
    ///
    /// # Errors
    /// `Resampling` for a zero or absurd rate, a channel count outside 1..=8,
    /// or when rubato rejects the configuration.
    pub fn new(
        input_rate: u32,
        output_rate: u32,
        channels: usize,
        quality: ResamplingQuality,
    ) -> Result<Self> {
        for rate in [input_rate, output_rate] {
            if rate == 0 || rate > 1_000_000 {
                return Err(AudioError::Resampling(format!("invalid sample rate: {} Hz", rate)));
            }
        }
        if channels == 0 || channels > 8 {
            return Err(AudioError::Resampling(format!(
                "invalid channel count: {}",
                channels
            )));
        }

        let ratio = f64::from(output_rate) / f64::from(input_rate);
        let chunk_size = quality.chunk_size();
        let backend = if input_rate == output_rate {
            Backend::Passthrough
        } else if quality == ResamplingQuality::Fast {
            Backend::Fast(
                FastFixedIn::new(ratio, 2.0, PolynomialDegree::Linear, chunk_size, channels)
                    .map_err(|e| AudioError::Resampling(format!("FastFixedIn: {}", e)))?,
            )
        } else {
            Backend::Sinc(
                SincFixedIn::<f32>::new(ratio, 2.0, quality.sinc_params(), chunk_size, channels)
                    .map_err(|e| AudioError::Resampling(format!("SincFixedIn: {}", e)))?,
            )
        };

        let (max_in, max_out) = match &backend {
            Backend::Fast(r) => (r.input_frames_max(), r.output_frames_max()),
            Backend::Sinc(r) => (r.input_frames_max(), r.output_frames_max()),
            Backend::Passthrough => (0, 0),
        };

        Ok(Self {
            backend,
            input_rate,
            output_rate,
            channels,
            input_buffer: VecDeque::with_capacity((max_in * 2 + INPUT_HEADROOM_FRAMES) * channels),
            planar_in: (0..channels).map(|_| Vec::with_capacity(max_in)).collect(),
            planar_out: (0..channels).map(|_| vec![0.0; max_out]).collect(),
        })
    }

    /// Input sample rate (Hz)
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Output sample rate (Hz)
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Channel count
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whether samples pass through unchanged
    pub fn is_passthrough(&self) -> bool {
        matches!(self.backend, Backend::Passthrough)
    }

    /// Resample interleaved input; may return fewer frames than a full ratio
    /// while the first chunk fills
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let mut output = VecDeque::new();
        self.process_into(input, &mut output)?;
        Ok(output.into())
    }

    /// Resample interleaved input onto the back of `output`
    ///
    /// Returns the number of samples appended.
    pub fn process_into(&mut self, input: &[f32], output: &mut VecDeque<f32>) -> Result<usize> {
        if input.len() % self.channels != 0 {
            return Err(AudioError::Resampling(format!(
                "input of {} samples is not a multiple of {} channels",
                input.len(),
                self.channels
            )));
        }
        if self.is_passthrough() {
            output.extend(input.iter().copied());
            return Ok(input.len());
        }

        self.input_buffer.extend(input.iter().copied());

        let channels = self.channels;
        let mut written = 0;
        loop {
            let needed_frames = match &self.backend {
                Backend::Fast(r) => r.input_frames_next(),
                Backend::Sinc(r) => r.input_frames_next(),
                Backend::Passthrough => break,
            };
            let needed_samples = needed_frames * channels;
            if self.input_buffer.len() < needed_samples {
                break;
            }

            for channel in &mut self.planar_in {
                channel.clear();
            }
            for (i, sample) in self.input_buffer.drain(..needed_samples).enumerate() {
                self.planar_in[i % channels].push(sample);
            }

            let (_, frames) = match &mut self.backend {
                Backend::Fast(r) => r.process_into_buffer(
                    self.planar_in.as_slice(),
                    self.planar_out.as_mut_slice(),
                    None,
                ),
                Backend::Sinc(r) => r.process_into_buffer(
                    self.planar_in.as_slice(),
                    self.planar_out.as_mut_slice(),
                    None,
                ),
                Backend::Passthrough => break,
            }
            .map_err(|e| AudioError::Resampling(e.to_string()))?;

            for frame in 0..frames {
                for channel in &self.planar_out {
                    output.push_back(channel[frame]);
                }
            }
            written += frames * channels;
        }

        Ok(written)
    }

    /// Push out whatever is still buffered (end of stream)
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        if self.input_buffer.is_empty() {
            return Ok(Vec::new());
        }
        let remaining: Vec<f32> = self.input_buffer.drain(..).collect();
        if self.is_passthrough() {
            return Ok(remaining);
        }

        let planar = deinterleave(&remaining, self.channels);
        let resampled = match &mut self.backend {
            Backend::Fast(r) => r.process_partial(Some(planar.as_slice()), None),
            Backend::Sinc(r) => r.process_partial(Some(planar.as_slice()), None),
            Backend::Passthrough => return Ok(remaining),
        }
        .map_err(|e| AudioError::Resampling(e.to_string()))?;

        let mut output = Vec::new();
        interleave_into(&resampled, &mut output);
        Ok(output)
    }

    /// Drop buffered input and filter history
    pub fn reset(&mut self) {
        self.input_buffer.clear();
        match &mut self.backend {
            Backend::Fast(r) => r.reset(),
            Backend::Sinc(r) => r.reset(),
            Backend::Passthrough => {}
        }
    }
}

impl std::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resampler")
            .field("input_rate", &self.input_rate)
            .field("output_rate", &self.output_rate)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

/// `[L, R, L, R, ...]` to `[[L, L, ...], [R, R, ...]]`
fn deinterleave(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = interleaved.len() / channels;
    let mut planar: Vec<Vec<f32>> = (0..channels).map(|_| Vec::with_capacity(frames)).collect();
    for frame in interleaved.chunks_exact(channels) {
        for (channel, &sample) in planar.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }
    planar
}

fn interleave_into(planar: &[Vec<f32>], output: &mut Vec<f32>) {
    let frames = planar.first().map_or(0, Vec::len);
    output.reserve(frames * planar.len());
    for frame in 0..frames {
        for channel in planar {
            output.push(channel[frame]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleave_interleave() {
        let interleaved = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let planar = deinterleave(&interleaved, 2);
        assert_eq!(planar[0], vec![1.0, 3.0, 5.0]);
        assert_eq!(planar[1], vec![2.0, 4.0, 6.0]);

        let mut back = Vec::new();
        interleave_into(&planar, &mut back);
        assert_eq!(back, interleaved);
    }

    #[test]
    fn matching_rates_pass_through() {
        let mut resampler = Resampler::new(48_000, 48_000, 2, ResamplingQuality::High).unwrap();
        assert!(resampler.is_passthrough());
        let input = vec![0.25, -0.25, 0.5, -0.5];
        assert_eq!(resampler.process(&input).unwrap(), input);
    }

    #[test]
    fn rejects_invalid_setup() {
        assert!(Resampler::new(0, 48_000, 2, ResamplingQuality::Fast).is_err());
        assert!(Resampler::new(44_100, 2_000_000, 2, ResamplingQuality::Fast).is_err());
        assert!(Resampler::new(44_100, 48_000, 0, ResamplingQuality::Fast).is_err());
        assert!(Resampler::new(44_100, 48_000, 9, ResamplingQuality::Fast).is_err());
    }

    #[test]
    fn rejects_ragged_input() {
        let mut resampler = Resampler::new(44_100, 48_000, 2, ResamplingQuality::Fast).unwrap();
        assert!(resampler.process(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn process_into_keeps_its_buffers() {
        let mut resampler = Resampler::new(44_100, 48_000, 2, ResamplingQuality::Fast).unwrap();
        let mut output = VecDeque::with_capacity(16_384);
        let capacity = output.capacity();

        let mut appended = 0;
        for _ in 0..4 {
            appended += resampler.process_into(&vec![0.5; 2048], &mut output).unwrap();
        }
        assert_eq!(appended, output.len());
        assert!(output.len() > 6_000, "{} samples", output.len());
        assert_eq!(output.capacity(), capacity);
    }

    #[test]
    fn output_length_tracks_ratio() {
        for quality in [ResamplingQuality::Fast, ResamplingQuality::Balanced] {
            let mut resampler = Resampler::new(44_100, 48_000, 2, quality).unwrap();
            let mut total = 0;
            for _ in 0..43 {
                total += resampler.process(&vec![0.1; 2048]).unwrap().len();
            }
            total += resampler.flush().unwrap().len();

            // 43 * 1024 input frames -> about 47_926 output frames
            let frames = total / 2;
            assert!((47_000..49_000).contains(&frames), "{quality:?}: {frames} frames");
        }
    }
}
