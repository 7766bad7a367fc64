//! Spectrum analyzer
//!
//! Blocks are folded to mono and accumulated; every time a full window is
//! available a Hann-windowed FFT produces one [`SpectrumFrame`] and the
//! window advances by the hop size. Frames go to a [`SpectrumSlot`] that
//! holds only the newest one.

use crate::error::{AudioError, Result};
use aural_core::{AudioBlock, SpectrumFrame};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::trace;

/// Analysis window and hop, fixed for the lifetime of an analyzer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// FFT length in samples
    pub window_size: usize,
    /// Samples the window advances between frames
    pub hop_size: usize,
    /// Lowest reported magnitude (dB)
    pub floor_db: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            window_size: 2048,
            hop_size: 1024,
            floor_db: -100.0,
        }
    }
}

impl SpectrumConfig {
    /// Check that the window and hop describe a valid overlap
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 2 {
            return Err(AudioError::InvalidConfig(format!(
                "spectrum window {} is too small",
                self.window_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.window_size {
            return Err(AudioError::InvalidConfig(format!(
                "spectrum hop {} must be within 1..={}",
                self.hop_size, self.window_size
            )));
        }
        if !self.floor_db.is_finite() {
            return Err(AudioError::InvalidConfig(format!(
                "spectrum floor {} dB is not finite",
                self.floor_db
            )));
        }
        Ok(())
    }

    /// Frames produced by a continuous feed of `samples` mono samples
    pub fn frames_for(&self, samples: usize) -> usize {
        if samples < self.window_size || self.hop_size == 0 {
            0
        } else {
            (samples - self.window_size) / self.hop_size + 1
        }
    }
}

/// Single-slot, newest-wins handoff to a visualization consumer
///
/// The lock is held only to swap an `Option`, never while computing.
#[derive(Debug, Clone, Default)]
pub struct SpectrumSlot {
    frame: Arc<Mutex<Option<SpectrumFrame>>>,
    published: Arc<AtomicU64>,
    replaced: Arc<AtomicU64>,
}

impl SpectrumSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a frame, dropping any frame nobody took
    ///
    /// Returns `true` when an unconsumed frame was replaced.
    pub fn publish(&self, frame: SpectrumFrame) -> bool {
        let previous = self
            .frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(frame);
        self.published.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.replaced.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Take the newest frame, if one arrived since the last take
    pub fn take(&self) -> Option<SpectrumFrame> {
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Drop any frame waiting in the slot
    pub fn clear(&self) {
        self.take();
    }

    /// Frames published so far
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames overwritten before a consumer took them
    pub fn replaced_count(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }
}

/// Windowed FFT analyzer
pub struct SpectrumAnalyzer {
    config: SpectrumConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Scale that maps a full-scale sine to 1.0
    normalization: f32,
    /// Mono samples waiting for analysis
    pending: VecDeque<f32>,
    /// Stream frame of `pending[0]`
    pending_start: u64,
    sample_rate: u32,
    scratch: Vec<Complex<f32>>,
    slot: SpectrumSlot,
}

impl SpectrumAnalyzer {
    /// Create an analyzer publishing to a fresh slot
    ///
    /// An invalid configuration falls back to the defaults.
    pub fn new(config: SpectrumConfig) -> Self {
        Self::with_slot(config, SpectrumSlot::new())
    }

    /// Create an analyzer publishing to an existing slot
    pub fn with_slot(config: SpectrumConfig, slot: SpectrumSlot) -> Self {
        let config = if config.validate().is_ok() {
            config
        } else {
            tracing::warn!(?config, "Invalid spectrum config, using defaults");
            SpectrumConfig::default()
        };

        let size = config.window_size;
        let window: Vec<f32> = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
            .collect();
        let coherent_gain = window.iter().sum::<f32>() / size as f32;
        let fft = FftPlanner::new().plan_fft_forward(size);

        Self {
            normalization: 2.0 / (size as f32 * coherent_gain),
            fft,
            window,
            pending: VecDeque::with_capacity(size * 2),
            pending_start: 0,
            sample_rate: 0,
            scratch: vec![Complex::new(0.0, 0.0); size],
            slot,
            config,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> SpectrumConfig {
        self.config
    }

    /// The slot frames are published to
    pub fn slot(&self) -> SpectrumSlot {
        self.slot.clone()
    }

    /// Samples buffered but not yet analyzed
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    /// Forget buffered samples (seek or track change)
    pub fn reset(&mut self) {
        self.pending.clear();
        self.sample_rate = 0;
    }

    /// Accumulate a block and publish every frame it completes
    ///
    /// Returns the number of frames produced. A jump in stream position or
    /// sample rate restarts the window.
    pub fn feed(&mut self, block: &AudioBlock) -> usize {
        let channels = usize::from(block.channels.max(1));
        let frames = match block.frame_offset {
            Some(_) => block.valid_frames.min(block.frames()),
            None => block.frames(),
        };
        if frames == 0 {
            return 0;
        }

        let expected = self.pending_start + self.pending.len() as u64;
        let discontinuous = block.frame_offset.is_some_and(|offset| offset != expected);
        if block.sample_rate != self.sample_rate || discontinuous {
            self.pending.clear();
            self.sample_rate = block.sample_rate;
        }
        if self.pending.is_empty() {
            self.pending_start = block.frame_offset.unwrap_or(expected);
        }

        let scale = 1.0 / channels as f32;
        self.pending.extend(
            block.samples[..frames * channels]
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() * scale),
        );

        let mut produced = 0;
        while self.pending.len() >= self.config.window_size {
            let frame = self.analyze_window();
            self.slot.publish(frame);
            self.pending.drain(..self.config.hop_size);
            self.pending_start += self.config.hop_size as u64;
            produced += 1;
        }
        produced
    }

    /// Run the FFT over the first window of pending samples
    fn analyze_window(&mut self) -> SpectrumFrame {
        for ((bin, &sample), &weight) in self
            .scratch
            .iter_mut()
            .zip(self.pending.iter())
            .zip(self.window.iter())
        {
            *bin = Complex::new(sample * weight, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let floor = self.config.floor_db;
        let magnitudes: Vec<f32> = self.scratch[..=self.config.window_size / 2]
            .iter()
            .map(|bin| (20.0 * (bin.norm() * self.normalization).log10()).max(floor))
            .collect();

        let timestamp = if self.sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(self.pending_start as f64 / f64::from(self.sample_rate))
        };
        trace!(?timestamp, "spectrum frame");

        SpectrumFrame {
            magnitudes,
            timestamp,
            sample_rate: self.sample_rate,
            window_size: self.config.window_size,
        }
    }
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
