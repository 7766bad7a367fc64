//! Device-side rendering
//!
//! Runs inside the device callback: pops blocks from the playback buffer,
//! converts them to the device's rate and channel layout, and fills the
//! callback's output slice. Whatever a block yields beyond the current
//! callback is kept for the next one, so block and callback sizes need not
//! match.
//!
//! The callback never builds a resampler. When a block arrives at a rate
//! with no prepared resampler, the block is held, the callback plays
//! silence, and the rate is sent to the output thread, which builds one and
//! installs it with [`Renderer::install_resampler`].

use aural_audio::Resampler;
use aural_core::AudioBlock;
use aural_playback::PlaybackBuffer;
use crossbeam_channel::Sender;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use tracing::{debug, warn};

/// Device-format samples kept ready between callbacks
const PENDING_CAPACITY: usize = 16_384;

/// Frames of headroom reserved per device channel on a format change
const RESERVE_FRAMES: usize = 8_192;

/// Converts pipeline blocks to device samples
#[derive(Debug)]
pub struct Renderer {
    buffer: Option<Arc<PlaybackBuffer>>,
    /// Flush generation the converted samples belong to
    generation: u64,
    device_rate: u32,
    device_channels: u16,
    resampler: Option<Resampler>,
    /// Block waiting for a resampler at its rate
    held: Option<AudioBlock>,
    resampler_requests: Option<Sender<u32>>,
    /// Interleaved samples in device format
    pending: VecDeque<f32>,
    /// Source-rate samples after channel mapping, before resampling
    mapped: Vec<f32>,
}

impl Renderer {
    /// Create a renderer for a device format
    pub fn new(device_rate: u32, device_channels: u16) -> Self {
        let mut renderer = Self {
            buffer: None,
            generation: 0,
            device_rate,
            device_channels: device_channels.max(1),
            resampler: None,
            held: None,
            resampler_requests: None,
            pending: VecDeque::with_capacity(PENDING_CAPACITY),
            mapped: Vec::with_capacity(PENDING_CAPACITY),
        };
        renderer.reserve();
        renderer
    }

    /// Send rates that need a resampler to `requests`
    pub fn request_resamplers(&mut self, requests: Sender<u32>) {
        self.resampler_requests = Some(requests);
    }

    /// Pull from `buffer` from now on
    pub fn attach(&mut self, buffer: Arc<PlaybackBuffer>) {
        self.generation = buffer.generation();
        self.buffer = Some(buffer);
    }

    /// Stop pulling
    pub fn detach(&mut self) {
        self.buffer = None;
        self.held = None;
        self.pending.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    /// Sample rate of the attached buffer's stream, if known
    pub fn source_rate(&self) -> Option<u32> {
        self.buffer
            .as_ref()
            .map(|b| b.sample_rate())
            .filter(|rate| *rate != 0)
    }

    /// Switch to a new device format
    ///
    /// Samples already converted for the old format are dropped when the
    /// format changes; blocks still in the playback buffer are untouched.
    pub fn reconfigure(&mut self, device_rate: u32, device_channels: u16) {
        let device_channels = device_channels.max(1);
        if device_rate == self.device_rate && device_channels == self.device_channels {
            return;
        }
        self.device_rate = device_rate;
        self.device_channels = device_channels;
        self.pending.clear();
        self.resampler = None;
        self.reserve();
    }

    /// Whether blocks at `source_rate` need a resampler that is not installed
    pub fn needs_resampler(&self, source_rate: u32) -> bool {
        source_rate != 0
            && source_rate != self.device_rate
            && self.resampler.as_ref().map(Resampler::input_rate) != Some(source_rate)
    }

    /// Install a resampler built off the audio thread
    ///
    /// Ignored when it does not convert to the current device format.
    pub fn install_resampler(&mut self, resampler: Resampler) {
        if resampler.output_rate() != self.device_rate
            || resampler.channels() != usize::from(self.device_channels)
        {
            debug!(?resampler, "Stale resampler discarded");
            return;
        }
        self.resampler = Some(resampler);
    }

    /// Device channel count
    pub fn device_channels(&self) -> u16 {
        self.device_channels
    }

    /// Device sample rate
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    /// Fill one callback's worth of interleaved device samples
    ///
    /// Never waits: when the buffer runs dry the rest is silence.
    pub fn render(&mut self, out: &mut [f32]) {
        self.discard_flushed();

        while self.pending.len() < out.len() {
            let block = match self.held.take() {
                Some(block) => block,
                None => match self.buffer.as_ref().and_then(|b| b.try_pop()) {
                    Some(block) => block,
                    None => break,
                },
            };
            if !self.convert(block) {
                break;
            }
        }

        let ready = self.pending.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(self.pending.drain(..ready)) {
            *slot = sample;
        }
        out[ready..].fill(0.0);
    }

    /// Drop converted samples from before the latest buffer flush
    fn discard_flushed(&mut self) {
        let Some(generation) = self.buffer.as_ref().map(|b| b.generation()) else {
            return;
        };
        if generation == self.generation {
            return;
        }
        self.generation = generation;
        self.held = None;
        self.pending.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    /// Channel-map and resample one block into `pending`
    ///
    /// Returns false when the block is held until a resampler arrives.
    fn convert(&mut self, block: AudioBlock) -> bool {
        if !block.is_silence() && self.needs_resampler(block.sample_rate) {
            if let Some(requests) = &self.resampler_requests {
                let _ = requests.try_send(block.sample_rate);
            }
            self.held = Some(block);
            return false;
        }

        let channels = usize::from(block.channels.max(1));
        let frames = if block.is_silence() {
            block.frames()
        } else {
            block.valid_frames.min(block.frames())
        };
        let samples = &block.samples[..frames * channels];

        self.mapped.clear();
        map_channels(samples, channels, usize::from(self.device_channels), &mut self.mapped);

        if block.sample_rate == self.device_rate || block.sample_rate == 0 || block.is_silence() {
            self.pending.extend(self.mapped.iter().copied());
            return true;
        }
        if let Some(resampler) = self.resampler.as_mut() {
            if let Err(e) = resampler.process_into(&self.mapped, &mut self.pending) {
                warn!(error = %e, "Resampling failed, block dropped");
            }
        }
        true
    }

    fn reserve(&mut self) {
        let samples = RESERVE_FRAMES * usize::from(self.device_channels);
        self.pending.reserve(samples.saturating_sub(self.pending.len()));
        self.mapped.reserve(samples.saturating_sub(self.mapped.len()));
    }
}

/// Map interleaved `from`-channel frames onto `to` channels
///
/// Mono devices get the average; devices with more than two channels get
/// the stereo pair on the first two and silence on the rest.
fn map_channels(samples: &[f32], from: usize, to: usize, out: &mut Vec<f32>) {
    if from == to {
        out.extend_from_slice(samples);
        return;
    }
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for ch in 0..to {
                let sample = match (from, ch) {
                    (1, 0 | 1) => frame[0],
                    (_, ch) if ch < from.min(2) => frame[ch],
                    _ => 0.0,
                };
                out.push(sample);
            }
        }
    }
}

/// Render entry point handed to a device stream
///
/// Each stream gets its own id; only the stream whose id is current renders
/// audio. A stream that has been replaced during a hot-swap, or that calls
/// back while the output thread holds the renderer, plays silence.
#[derive(Debug, Clone)]
pub struct RenderHandle {
    renderer: Arc<Mutex<Renderer>>,
    current: Arc<AtomicU64>,
    stream_id: u64,
}

impl RenderHandle {
    pub(crate) fn new(renderer: Arc<Mutex<Renderer>>, current: Arc<AtomicU64>, stream_id: u64) -> Self {
        Self {
            renderer,
            current,
            stream_id,
        }
    }

    /// Id of the stream this handle belongs to
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// Fill `out` from the playback buffer, or with silence
    pub fn render(&self, out: &mut [f32]) {
        if self.current.load(Ordering::Acquire) != self.stream_id {
            out.fill(0.0);
            return;
        }
        match self.renderer.try_lock() {
            Ok(mut renderer) => renderer.render(out),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().render(out),
            Err(TryLockError::WouldBlock) => out.fill(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aural_audio::ResamplingQuality;
    use aural_playback::PushPolicy;
    use crossbeam_channel::bounded;

    fn buffer_with(blocks: &[AudioBlock]) -> Arc<PlaybackBuffer> {
        let buffer = Arc::new(PlaybackBuffer::new(8, PushPolicy::FailFast));
        for block in blocks {
            buffer.push(block.clone()).unwrap();
        }
        buffer
    }

    #[test]
    fn stereo_passthrough_spans_callbacks() {
        let block = AudioBlock::new(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 48_000, 2, 0);
        let mut renderer = Renderer::new(48_000, 2);
        renderer.attach(buffer_with(&[block]));

        let mut out = [1.0; 4];
        renderer.render(&mut out);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.4]);

        renderer.render(&mut out);
        assert_eq!(out, [0.5, 0.6, 0.0, 0.0]);
    }

    #[test]
    fn padding_is_not_played() {
        let mut block = AudioBlock::new(vec![0.5; 4], 48_000, 2, 0);
        block.pad_to(8);
        let mut renderer = Renderer::new(48_000, 2);
        let buffer = buffer_with(&[block]);
        renderer.attach(Arc::clone(&buffer));

        let mut out = [1.0; 16];
        renderer.render(&mut out);
        assert_eq!(&out[..4], &[0.5; 4]);
        assert!(out[4..].iter().all(|s| *s == 0.0));
        assert_eq!(buffer.playhead_frame(), 2);
    }

    #[test]
    fn mono_device_gets_average() {
        let mut out = Vec::new();
        map_channels(&[0.2, 0.4, -1.0, 1.0], 2, 1, &mut out);
        assert_eq!(out, vec![0.3, 0.0]);
    }

    #[test]
    fn surround_device_gets_front_pair() {
        let mut out = Vec::new();
        map_channels(&[0.2, 0.4], 2, 6, &mut out);
        assert_eq!(out, vec![0.2, 0.4, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn rate_mismatch_is_resampled() {
        let blocks: Vec<_> = (0..8)
            .map(|i| AudioBlock::new(vec![0.25; 2048], 44_100, 2, i * 1024))
            .collect();
        let mut renderer = Renderer::new(48_000, 2);
        renderer.attach(buffer_with(&blocks));
        renderer.install_resampler(Resampler::new(44_100, 48_000, 2, ResamplingQuality::Fast).unwrap());

        let mut out = vec![0.0; 8 * 1024 * 2];
        renderer.render(&mut out);

        // 8192 input frames yield about 8916 output frames, minus resampler latency
        let audible = out.iter().filter(|s| s.abs() > 0.01).count() / 2;
        assert!(audible > 7_000, "{audible} frames rendered");
    }

    #[test]
    fn missing_resampler_is_requested_not_built() {
        let block = AudioBlock::new(vec![0.25; 2048], 44_100, 2, 0);
        let (requests, requested) = bounded(1);
        let mut renderer = Renderer::new(48_000, 2);
        renderer.request_resamplers(requests);
        renderer.attach(buffer_with(&[block]));

        let mut out = vec![1.0; 512];
        renderer.render(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(requested.try_recv(), Ok(44_100));
        assert!(renderer.needs_resampler(44_100));

        // A resampler for another device format is refused
        renderer.install_resampler(Resampler::new(44_100, 96_000, 2, ResamplingQuality::Fast).unwrap());
        assert!(renderer.needs_resampler(44_100));

        renderer.install_resampler(Resampler::new(44_100, 48_000, 2, ResamplingQuality::Fast).unwrap());
        assert!(!renderer.needs_resampler(44_100));
        renderer.render(&mut out);
        assert!(out.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn flush_discards_converted_samples() {
        let buffer = buffer_with(&[AudioBlock::new(vec![0.9; 8], 48_000, 2, 0)]);
        let mut renderer = Renderer::new(48_000, 2);
        renderer.attach(Arc::clone(&buffer));

        let mut out = [0.0; 4];
        renderer.render(&mut out);
        assert_eq!(out, [0.9; 4]);

        buffer.flush();
        buffer
            .push(AudioBlock::new(vec![-0.5; 8], 48_000, 2, 100_000))
            .unwrap();
        renderer.render(&mut out);
        assert_eq!(out, [-0.5; 4]);
    }

    #[test]
    fn replaced_stream_plays_silence() {
        let block = AudioBlock::new(vec![0.5; 8], 48_000, 2, 0);
        let mut renderer = Renderer::new(48_000, 2);
        renderer.attach(buffer_with(&[block]));

        let renderer = Arc::new(Mutex::new(renderer));
        let current = Arc::new(AtomicU64::new(2));
        let old = RenderHandle::new(Arc::clone(&renderer), Arc::clone(&current), 1);
        let new = RenderHandle::new(renderer, current, 2);

        let mut out = [1.0; 8];
        old.render(&mut out);
        assert_eq!(out, [0.0; 8]);

        new.render(&mut out);
        assert_eq!(out, [0.5; 8]);
    }
}
