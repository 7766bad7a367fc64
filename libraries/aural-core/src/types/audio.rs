/// Audio block types
use std::time::Duration;

/// A fixed-size chunk of interleaved PCM
///
/// Samples are f32 in the range [-1.0, 1.0], interleaved `[L, R, L, R, ...]`
/// for stereo. A block is owned by exactly one pipeline stage at a time and
/// moves stage to stage by value.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    /// Interleaved samples
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channels: u16,

    /// Stream position of the first frame, `None` for generated silence
    pub frame_offset: Option<u64>,

    /// Frames carrying decoded audio (the rest is zero padding)
    pub valid_frames: usize,
}

impl AudioBlock {
    /// Create a block of decoded audio starting at `frame_offset`
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16, frame_offset: u64) -> Self {
        let valid_frames = samples.len() / usize::from(channels.max(1));
        Self {
            samples,
            sample_rate,
            channels,
            frame_offset: Some(frame_offset),
            valid_frames,
        }
    }

    /// Create a block of silence that belongs to no stream position
    pub fn silence(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: vec![0.0; frames * usize::from(channels)],
            sample_rate,
            channels,
            frame_offset: None,
            valid_frames: 0,
        }
    }

    /// Pad with zeros up to `frames`, keeping `valid_frames` unchanged
    pub fn pad_to(&mut self, frames: usize) {
        let target = frames * usize::from(self.channels);
        if self.samples.len() < target {
            self.samples.resize(target, 0.0);
        }
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }

    /// Duration of the block
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Stream time of the first frame
    pub fn start_time(&self) -> Option<Duration> {
        let offset = self.frame_offset?;
        if self.sample_rate == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(offset as f64 / f64::from(self.sample_rate)))
    }

    /// Stream position just past the last valid frame
    pub fn end_offset(&self) -> Option<u64> {
        self.frame_offset.map(|offset| offset + self.valid_frames as u64)
    }

    /// Whether this block was generated as silence rather than decoded
    pub fn is_silence(&self) -> bool {
        self.frame_offset.is_none()
    }

    /// Check if the block holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Peak absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }
}
