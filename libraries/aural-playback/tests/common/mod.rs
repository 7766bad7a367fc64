//! Shared test doubles: scripted sources and a simulated device

#![allow(dead_code)]

use aural_audio::{AudioError, DecoderFamily, StreamProperties};
use aural_core::{AudioBlock, DeviceDescriptor, DeviceEvent};
use aural_playback::{BlockSource, OutputStage, PlaybackBuffer, PlaybackError, SourceOpener};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const RATE: u32 = 44_100;

// ===== Scripted Source =====

/// What a scripted track does
#[derive(Debug, Clone)]
pub struct Script {
    pub frames: u64,
    /// Block indices whose decode fails (once each)
    pub failing_blocks: HashSet<u64>,
    pub level: f32,
}

impl Script {
    pub fn seconds(seconds: f64) -> Self {
        Self {
            frames: (seconds * f64::from(RATE)) as u64,
            failing_blocks: HashSet::new(),
            level: 0.25,
        }
    }

    pub fn failing(mut self, blocks: &[u64]) -> Self {
        self.failing_blocks.extend(blocks);
        self
    }
}

pub struct ScriptedSource {
    script: Script,
    block_frames: usize,
    next_frame: u64,
    block_index: u64,
}

impl BlockSource for ScriptedSource {
    fn properties(&self) -> StreamProperties {
        StreamProperties {
            sample_rate: RATE,
            channels: 2,
            duration: Some(Duration::from_secs_f64(
                self.script.frames as f64 / f64::from(RATE),
            )),
            family: DecoderFamily::Pcm,
        }
    }

    fn read_block(&mut self) -> aural_playback::Result<Option<AudioBlock>> {
        if self.next_frame >= self.script.frames {
            return Ok(None);
        }
        let index = self.block_index;
        let offset = self.next_frame;
        let frames = (self.script.frames - offset).min(self.block_frames as u64) as usize;
        self.block_index += 1;
        self.next_frame += frames as u64;

        if self.script.failing_blocks.remove(&index) {
            return Err(PlaybackError::Audio(AudioError::DecodeError(format!(
                "corrupt packet in block {index}"
            ))));
        }

        let mut block = AudioBlock::new(vec![self.script.level; frames * 2], RATE, 2, offset);
        block.pad_to(self.block_frames);
        Ok(Some(block))
    }

    fn seek(&mut self, position: Duration) -> aural_playback::Result<Duration> {
        let frame = ((position.as_secs_f64() * f64::from(RATE)) as u64).min(self.script.frames);
        self.next_frame = frame;
        self.block_index = frame / self.block_frames as u64;
        Ok(Duration::from_secs_f64(frame as f64 / f64::from(RATE)))
    }
}

/// Opens scripted tracks by path; unknown paths are unsupported
#[derive(Default)]
pub struct ScriptedOpener {
    tracks: HashMap<PathBuf, Script>,
}

impl ScriptedOpener {
    pub fn with(mut self, path: &str, script: Script) -> Self {
        self.tracks.insert(PathBuf::from(path), script);
        self
    }
}

impl SourceOpener for ScriptedOpener {
    fn open(
        &mut self,
        path: &Path,
        block_frames: usize,
    ) -> aural_playback::Result<Box<dyn BlockSource>> {
        let script = self.tracks.get(path).cloned().ok_or_else(|| {
            PlaybackError::Audio(AudioError::UnsupportedFormat(path.display().to_string()))
        })?;
        Ok(Box::new(ScriptedSource {
            script,
            block_frames,
            next_frame: 0,
            block_index: 0,
        }))
    }
}

// ===== Simulated Device =====

/// Test-side view of a [`SimulatedOutput`]
#[derive(Clone)]
pub struct DeviceProbe {
    /// Frame offsets of every decoded block the device pulled, in order
    pub played: Arc<Mutex<Vec<u64>>>,
    pub events: Sender<DeviceEvent>,
    pub pulling: Arc<AtomicBool>,
}

impl DeviceProbe {
    pub fn played(&self) -> Vec<u64> {
        self.played.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.played.lock().unwrap().clear();
    }
}

/// Pulls one block per `interval` on its own thread, like a device callback
pub struct SimulatedOutput {
    interval: Duration,
    device: Option<DeviceDescriptor>,
    probe: DeviceProbe,
    event_rx: Receiver<DeviceEvent>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SimulatedOutput {
    pub fn new(interval: Duration) -> (Self, DeviceProbe) {
        let (events, event_rx) = unbounded();
        let probe = DeviceProbe {
            played: Arc::new(Mutex::new(Vec::new())),
            events,
            pulling: Arc::new(AtomicBool::new(false)),
        };
        let output = Self {
            interval,
            device: None,
            probe: probe.clone(),
            event_rx,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        };
        (output, probe)
    }
}

impl OutputStage for SimulatedOutput {
    fn open(
        &mut self,
        device: Option<&DeviceDescriptor>,
        buffer: Arc<PlaybackBuffer>,
    ) -> aural_playback::Result<DeviceDescriptor> {
        let device = device
            .cloned()
            .unwrap_or_else(|| DeviceDescriptor::new("Simulated", RATE, 2, true));
        self.device = Some(device.clone());

        if self.thread.is_none() {
            let interval = self.interval;
            let stop = Arc::clone(&self.stop);
            let pulling = Arc::clone(&self.probe.pulling);
            let played = Arc::clone(&self.probe.played);
            self.thread = Some(thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    if pulling.load(Ordering::Acquire) {
                        if let Some(offset) = buffer.try_pop().and_then(|b| b.frame_offset) {
                            played.lock().unwrap().push(offset);
                        }
                    }
                    thread::sleep(interval);
                }
            }));
        }
        self.probe.pulling.store(true, Ordering::Release);
        Ok(device)
    }

    fn pause(&mut self) -> aural_playback::Result<()> {
        self.probe.pulling.store(false, Ordering::Release);
        Ok(())
    }

    fn resume(&mut self) -> aural_playback::Result<()> {
        self.probe.pulling.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.device = None;
    }

    fn poll_event(&mut self) -> Option<DeviceEvent> {
        self.event_rx.try_recv().ok()
    }

    fn active_device(&self) -> Option<DeviceDescriptor> {
        self.device.clone()
    }
}

// ===== Helpers =====

/// Poll `condition` until it holds or `timeout` passes
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
