//! Playback engine
//!
//! One worker thread owns the pipeline (source, equalizer, analyzer, volume)
//! and the output stage. The public [`PlaybackEngine`] is a thin handle that
//! sends commands to it and reads shared state.
//!
//! ```text
//! caller ──commands──▶ worker: Decoder → EQ → {Analyzer → SpectrumSlot
//!                                             ; Volume → PlaybackBuffer}
//!                                                          │
//!                                   output thread ◀─pop────┘
//! ```
//!
//! Transport commands set a cancel flag before they are queued. A producer
//! blocked on a full buffer sees the flag, parks its block and returns to the
//! command loop, so stop and seek take effect within one push slice.

use crate::buffer::{PlaybackBuffer, Rejected};
use crate::error::{PlaybackError, Result};
use crate::events::{EventBus, PlaybackEvent};
use crate::output::OutputStage;
use crate::session::{duration_ms, PlaybackSession, SessionSnapshot};
use crate::source::{DecoderOpener, SourceOpener};
use crate::types::{EngineConfig, FailureReason, PlaybackState};
use crate::volume::Volume;
use aural_audio::{
    EqualizerHandle, GraphicEq, SpectrumAnalyzer, SpectrumSlot, StreamProperties, OUTPUT_CHANNELS,
};
use aural_core::{
    AudioBlock, DeviceDescriptor, DeviceEvent, EqualizerPreset, ErrorKind, SpectrumFrame,
    BAND_COUNT,
};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Longest a producer stays inside one blocking push
const PUSH_SLICE: Duration = Duration::from_millis(20);

/// Command wait while nothing is being produced
const IDLE_WAIT: Duration = Duration::from_millis(10);

type Reply<T> = Sender<Result<T>>;

enum Command {
    Load {
        path: PathBuf,
        start_at: Duration,
        reply: Reply<StreamProperties>,
    },
    Play(Reply<()>),
    Pause(Reply<()>),
    Resume(Reply<()>),
    Stop(Reply<()>),
    Seek {
        position: Duration,
        reply: Reply<Duration>,
    },
    OpenDevice {
        device: Option<DeviceDescriptor>,
        reply: Reply<DeviceDescriptor>,
    },
    SetVolume(u8),
    SetMuted(bool),
    Shutdown,
}

/// State readable from any thread
struct Shared {
    state: Mutex<PlaybackState>,
    state_changed: Condvar,
    failure: Mutex<Option<FailureReason>>,
    path: Mutex<Option<PathBuf>>,
    preset: Mutex<String>,
    volume: AtomicU8,
    muted: AtomicBool,
    cancel: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the playback worker
///
/// Transport calls block until the worker has applied them and return its
/// verdict. Equalizer edits go straight to the filter bank's update queue.
pub struct PlaybackEngine {
    commands: Sender<Command>,
    events: EventBus,
    shared: Arc<Shared>,
    buffer: Arc<PlaybackBuffer>,
    equalizer: EqualizerHandle,
    spectrum: SpectrumSlot,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Start an engine that decodes files with the symphonia decoder
    ///
    /// # Errors
    /// `InvalidInput` for a bad configuration, `Core(Io)` if the worker
    /// thread cannot be spawned.
    pub fn new(config: EngineConfig, output: Box<dyn OutputStage>) -> Result<Self> {
        Self::with_opener(config, output, Box::new(DecoderOpener))
    }

    /// Start an engine with a custom source opener
    pub fn with_opener(
        config: EngineConfig,
        output: Box<dyn OutputStage>,
        opener: Box<dyn SourceOpener>,
    ) -> Result<Self> {
        config.validate()?;

        let (commands, command_rx) = unbounded();
        let events = EventBus::new();
        let buffer = Arc::new(PlaybackBuffer::new(
            config.buffer_capacity,
            config.push_policy,
        ));
        let shared = Arc::new(Shared {
            state: Mutex::new(PlaybackState::Stopped),
            state_changed: Condvar::new(),
            failure: Mutex::new(None),
            path: Mutex::new(None),
            preset: Mutex::new(EqualizerPreset::flat().name().to_string()),
            volume: AtomicU8::new(config.volume.min(100)),
            muted: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
        });

        let equalizer = GraphicEq::new(44_100, OUTPUT_CHANNELS);
        let equalizer_handle = equalizer.handle();
        let analyzer = SpectrumAnalyzer::new(config.spectrum);
        let spectrum = analyzer.slot();

        let worker = Worker {
            volume: Volume::new(config.volume),
            next_tick: Instant::now(),
            reported_underruns: buffer.underruns(),
            config,
            commands: command_rx,
            events: events.clone(),
            shared: Arc::clone(&shared),
            buffer: Arc::clone(&buffer),
            output,
            opener,
            equalizer,
            analyzer,
            session: None,
            last_path: None,
            device: None,
        };

        let handle = thread::Builder::new()
            .name("aural-playback".to_string())
            .spawn(move || worker.run())
            .map_err(aural_core::AuralError::from)?;

        Ok(Self {
            commands,
            events,
            shared,
            buffer,
            equalizer: equalizer_handle,
            spectrum,
            worker: Some(handle),
        })
    }

    // ===== Transport =====

    /// Load a track and start playing it, optionally from `start_at`
    ///
    /// Allowed from every state except `Loading` and `Seeking`; a playing or
    /// paused track is replaced.
    pub fn load(&self, path: impl Into<PathBuf>, start_at: Duration) -> Result<StreamProperties> {
        let path = path.into();
        self.request(|reply| Command::Load {
            path,
            start_at,
            reply,
        })
    }

    /// Load the track the playlist supplied next
    pub fn next(&self, path: impl Into<PathBuf>) -> Result<StreamProperties> {
        self.load(path, Duration::ZERO)
    }

    /// Resume from `Paused`, or replay the last track from `Stopped`/`Failed`
    pub fn play(&self) -> Result<()> {
        self.request(Command::Play)
    }

    /// Stop feeding the buffer and pause the device; queued audio is kept
    pub fn pause(&self) -> Result<()> {
        self.request(Command::Pause)
    }

    /// Continue after [`pause`](Self::pause)
    pub fn resume(&self) -> Result<()> {
        self.request(Command::Resume)
    }

    /// Stop playback and drop the session
    pub fn stop(&self) -> Result<()> {
        self.request(Command::Stop)
    }

    /// Move to `position`; returns where playback actually resumes
    pub fn seek(&self, position: Duration) -> Result<Duration> {
        self.request(|reply| Command::Seek { position, reply })
    }

    /// Switch output to `device`, or back to following the system default
    pub fn open_device(&self, device: Option<DeviceDescriptor>) -> Result<DeviceDescriptor> {
        self.request(|reply| Command::OpenDevice { device, reply })
    }

    // ===== Volume =====

    /// Set volume (0-100, clamped)
    pub fn set_volume(&self, level: u8) -> Result<()> {
        self.send(Command::SetVolume(level.min(100)))
    }

    /// Mute or unmute
    pub fn set_muted(&self, muted: bool) -> Result<()> {
        self.send(Command::SetMuted(muted))
    }

    /// Current volume level (0-100)
    pub fn volume(&self) -> u8 {
        self.shared.volume.load(Ordering::Relaxed)
    }

    /// Whether output is muted
    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::Relaxed)
    }

    // ===== Equalizer =====

    /// Set one band's gain, effective from the next block
    ///
    /// Returns the gain actually applied after clamping to ±12 dB.
    pub fn set_band_gain(&self, index: usize, gain_db: f32) -> Result<f32> {
        let applied = self.equalizer.set_band_gain(index, gain_db)?;
        self.preset_changed("Custom");
        Ok(applied)
    }

    /// Load a built-in preset by name (case-insensitive)
    pub fn load_preset(&self, name: &str) -> Result<()> {
        let preset = EqualizerPreset::builtin(name)
            .ok_or_else(|| PlaybackError::InvalidInput(format!("unknown preset: {name}")))?;
        self.apply_preset(&preset);
        Ok(())
    }

    /// Validate and apply ten gains as a custom preset
    pub fn set_gains(&self, gains: &[f32]) -> Result<()> {
        self.equalizer.set_gains(gains)?;
        self.preset_changed("Custom");
        Ok(())
    }

    /// Swap all ten bands to an already validated preset
    pub fn apply_preset(&self, preset: &EqualizerPreset) {
        self.equalizer.load_preset(preset);
        self.preset_changed(preset.name());
    }

    /// Requested band gains (dB)
    pub fn band_gains(&self) -> [f32; BAND_COUNT] {
        self.equalizer.gains()
    }

    /// Name of the active preset ("Custom" after single band edits)
    pub fn preset_name(&self) -> String {
        lock(&self.shared.preset).clone()
    }

    /// Cloneable handle for editing the equalizer from another thread
    pub fn equalizer(&self) -> EqualizerHandle {
        self.equalizer.clone()
    }

    fn preset_changed(&self, name: &str) {
        *lock(&self.shared.preset) = name.to_string();
        self.events.emit(PlaybackEvent::PresetChanged {
            name: name.to_string(),
            gains: self.equalizer.gains(),
        });
    }

    // ===== Observation =====

    /// Take the newest spectrum frame, if one arrived since the last call
    pub fn take_spectrum_frame(&self) -> Option<SpectrumFrame> {
        self.spectrum.take()
    }

    /// The single-slot spectrum handoff, for a visualization thread
    pub fn spectrum_slot(&self) -> SpectrumSlot {
        self.spectrum.clone()
    }

    /// Current transport state
    pub fn state(&self) -> PlaybackState {
        *lock(&self.shared.state)
    }

    /// Position of the audio handed to the device
    pub fn position(&self) -> Duration {
        if self.state().has_track() {
            self.buffer.position()
        } else {
            Duration::ZERO
        }
    }

    /// Why the engine is in `Failed`
    pub fn failure(&self) -> Option<FailureReason> {
        lock(&self.shared.failure).clone()
    }

    /// Path of the loaded track
    pub fn current_path(&self) -> Option<PathBuf> {
        lock(&self.shared.path).clone()
    }

    /// Blocks queued for the device
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Underruns counted by the playback buffer
    pub fn underruns(&self) -> u64 {
        self.buffer.underruns()
    }

    /// Serializable session state, `None` when no track is loaded
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let path = self.current_path()?;
        Some(SessionSnapshot {
            path,
            position_ms: duration_ms(self.position()),
            preset: self.preset_name(),
            gains: self.band_gains(),
            volume: self.volume(),
        })
    }

    /// Subscribe to engine events
    ///
    /// Every call returns a new receiver that sees each event emitted from
    /// now on. Unread events beyond [`EVENT_CAPACITY`](crate::EVENT_CAPACITY)
    /// are dropped for that receiver only.
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Block until the engine reaches `state`, or `timeout` passes
    ///
    /// Returns whether the state was reached.
    pub fn wait_for_state(&self, state: PlaybackState, timeout: Duration) -> bool {
        let guard = lock(&self.shared.state);
        let (guard, _) = self
            .shared
            .state_changed
            .wait_timeout_while(guard, timeout, |current| *current != state)
            .unwrap_or_else(PoisonError::into_inner);
        *guard == state
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| PlaybackError::EngineShutDown)
    }

    /// Interrupt the producer and run a command on the worker
    fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = bounded(1);
        self.shared.cancel.store(true, Ordering::Release);
        self.send(command(reply))?;
        response.recv().map_err(|_| PlaybackError::EngineShutDown)?
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shared.cancel.store(true, Ordering::Release);
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("Playback worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("state", &self.state())
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

/// Owns the pipeline; runs on the worker thread
struct Worker {
    config: EngineConfig,
    commands: Receiver<Command>,
    events: EventBus,
    shared: Arc<Shared>,
    buffer: Arc<PlaybackBuffer>,
    output: Box<dyn OutputStage>,
    opener: Box<dyn SourceOpener>,
    equalizer: GraphicEq,
    analyzer: SpectrumAnalyzer,
    volume: Volume,
    session: Option<PlaybackSession>,
    /// Track to replay on `play` after stop or failure
    last_path: Option<PathBuf>,
    /// Explicitly chosen device, `None` follows the default
    device: Option<DeviceDescriptor>,
    next_tick: Instant,
    reported_underruns: u64,
}

/// Outcome of one production step
enum Step {
    Produced,
    Idle,
}

impl Worker {
    fn run(mut self) {
        debug!("Playback worker started");
        loop {
            self.shared.cancel.store(false, Ordering::Release);

            let wait = match self.step() {
                Step::Produced => None,
                Step::Idle => Some(IDLE_WAIT),
            };
            if !self.drain_commands(wait) {
                break;
            }

            while let Some(event) = self.output.poll_event() {
                self.on_device_event(event);
            }
            self.check_end_of_track();
            self.tick();
        }

        self.output.close();
        debug!("Playback worker stopped");
    }

    /// Handle queued commands, waiting up to `wait` for the first one
    ///
    /// Returns `false` on shutdown.
    fn drain_commands(&mut self, wait: Option<Duration>) -> bool {
        if let Some(wait) = wait {
            match self.commands.recv_timeout(wait) {
                Ok(command) => {
                    if !self.handle(command) {
                        return false;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return true,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
        while let Ok(command) = self.commands.try_recv() {
            if !self.handle(command) {
                return false;
            }
        }
        true
    }

    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Load {
                path,
                start_at,
                reply,
            } => {
                let _ = reply.send(self.load(path, start_at));
            }
            Command::Play(reply) => {
                let _ = reply.send(self.play());
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.pause());
            }
            Command::Resume(reply) => {
                let _ = reply.send(self.resume());
            }
            Command::Stop(reply) => {
                self.stop();
                let _ = reply.send(Ok(()));
            }
            Command::Seek { position, reply } => {
                let _ = reply.send(self.seek(position));
            }
            Command::OpenDevice { device, reply } => {
                let _ = reply.send(self.open_device(device));
            }
            Command::SetVolume(level) => {
                self.volume.set_level(level);
                self.volume_changed();
            }
            Command::SetMuted(muted) => {
                self.volume.set_muted(muted);
                self.volume_changed();
            }
            Command::Shutdown => return false,
        }
        true
    }

    // ===== State =====

    fn state(&self) -> PlaybackState {
        *lock(&self.shared.state)
    }

    fn emit(&self, event: PlaybackEvent) {
        self.events.emit(event);
    }

    /// Refuse a command the state machine does not allow
    fn require(&self, next: PlaybackState, action: &'static str) -> Result<()> {
        let from = self.state();
        if from.can_transition_to(next) {
            Ok(())
        } else {
            Err(PlaybackError::InvalidTransition { from, action })
        }
    }

    fn set_state(&self, next: PlaybackState) {
        let mut state = lock(&self.shared.state);
        if *state == next {
            return;
        }
        info!(from = %*state, to = %next, "Playback state changed");
        *state = next;
        drop(state);
        self.shared.state_changed.notify_all();
        self.emit(PlaybackEvent::StateChanged { state: next });
    }

    fn set_path(&self, path: Option<PathBuf>) {
        *lock(&self.shared.path) = path;
    }

    /// Enter `Failed` with a precise reason
    fn fail(&mut self, path: Option<PathBuf>, kind: ErrorKind, message: String) {
        error!(?path, %kind, %message, "Playback failed");
        self.buffer.flush();
        self.session = None;
        if let Err(e) = self.output.pause() {
            warn!(error = %e, "Failed to pause output");
        }
        *lock(&self.shared.failure) = Some(FailureReason {
            kind,
            message: message.clone(),
        });
        self.emit(PlaybackEvent::TrackFailed {
            path,
            kind,
            message,
        });
        self.set_state(PlaybackState::Failed);
    }

    fn volume_changed(&self) {
        self.shared
            .volume
            .store(self.volume.level(), Ordering::Relaxed);
        self.shared
            .muted
            .store(self.volume.is_muted(), Ordering::Relaxed);
        self.emit(PlaybackEvent::VolumeChanged {
            level: self.volume.level(),
            is_muted: self.volume.is_muted(),
        });
    }

    // ===== Transport =====

    fn load(&mut self, path: PathBuf, start_at: Duration) -> Result<StreamProperties> {
        self.require(PlaybackState::Loading, "load")?;

        self.buffer.flush();
        self.session = None;
        *lock(&self.shared.failure) = None;
        self.last_path = Some(path.clone());
        self.set_path(Some(path.clone()));
        self.set_state(PlaybackState::Loading);
        info!(path = %path.display(), "Loading track");

        let source = match self.opener.open(&path, self.config.block_frames) {
            Ok(source) => source,
            Err(e) => {
                self.fail(Some(path), e.kind(), e.to_string());
                return Err(e);
            }
        };

        let mut session = PlaybackSession::new(path.clone(), source);
        let properties = session.properties();
        self.equalizer
            .configure(properties.sample_rate, OUTPUT_CHANNELS);
        self.analyzer.reset();
        self.buffer.set_format(
            self.config.block_frames,
            properties.sample_rate,
            OUTPUT_CHANNELS,
        );

        let mut start_frame = 0;
        if !start_at.is_zero() {
            match session.source_mut().seek(start_at) {
                Ok(landed) => start_frame = frames_at(landed, properties.sample_rate),
                Err(e) => self.warn(e.kind(), format!("Could not resume at {start_at:?}: {e}")),
            }
        }
        self.buffer.reset_playhead(start_frame);

        if self.output.active_device().is_none() {
            if let Err(e) = self
                .output
                .open(self.device.as_ref(), Arc::clone(&self.buffer))
            {
                self.fail(Some(path), e.kind(), e.to_string());
                return Err(e);
            }
        }
        if let Err(e) = self.output.resume() {
            self.fail(Some(path), e.kind(), e.to_string());
            return Err(e);
        }

        self.session = Some(session);
        self.emit(PlaybackEvent::TrackLoaded {
            path,
            sample_rate: properties.sample_rate,
            channels: properties.channels,
            duration_ms: properties.duration.map(duration_ms),
        });
        self.set_state(PlaybackState::Playing);
        self.next_tick = Instant::now();
        Ok(properties)
    }

    fn play(&mut self) -> Result<()> {
        match self.state() {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => self.resume(),
            PlaybackState::Stopped | PlaybackState::Failed => {
                let path = self.last_path.clone().ok_or(PlaybackError::NoTrackLoaded)?;
                self.load(path, Duration::ZERO).map(|_| ())
            }
            from => Err(PlaybackError::InvalidTransition {
                from,
                action: "play",
            }),
        }
    }

    fn pause(&mut self) -> Result<()> {
        self.require(PlaybackState::Paused, "pause")?;
        self.output.pause()?;
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let from = self.state();
        if from != PlaybackState::Paused {
            return Err(PlaybackError::InvalidTransition {
                from,
                action: "resume",
            });
        }
        self.output.resume()?;
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    fn stop(&mut self) {
        self.buffer.flush();
        self.buffer.reset_playhead(0);
        self.session = None;
        self.set_path(None);
        *lock(&self.shared.failure) = None;
        if let Err(e) = self.output.pause() {
            warn!(error = %e, "Failed to pause output");
        }
        self.set_state(PlaybackState::Stopped);
    }

    /// Flush everything downstream of the decoder and reposition it
    ///
    /// Playback continues from the new position even when seeking from
    /// `Paused`.
    fn seek(&mut self, position: Duration) -> Result<Duration> {
        let from = self.state();
        if !from.has_track() || !from.can_transition_to(PlaybackState::Seeking) {
            return Err(PlaybackError::InvalidTransition {
                from,
                action: "seek",
            });
        }
        if self.session.is_none() {
            return Err(PlaybackError::NoTrackLoaded);
        }

        self.set_state(PlaybackState::Seeking);
        self.buffer.flush();
        self.equalizer.reset();
        self.analyzer.reset();
        self.spectrum_clear();

        let Some(session) = self.session.as_mut() else {
            return Err(PlaybackError::NoTrackLoaded);
        };
        session.repositioned();
        let rate = session.properties().sample_rate;
        let duration = session.duration_ms();
        let result = session.source_mut().seek(position);

        let outcome = match result {
            Ok(landed) => {
                self.buffer.reset_playhead(frames_at(landed, rate));
                self.emit(PlaybackEvent::PositionChanged {
                    position_ms: duration_ms(landed),
                    duration_ms: duration,
                });
                debug!(requested = ?position, ?landed, "Seek complete");
                Ok(landed)
            }
            Err(e) => {
                self.warn(e.kind(), format!("Seek to {position:?} failed: {e}"));
                Err(e)
            }
        };

        if from == PlaybackState::Paused {
            if let Err(e) = self.output.resume() {
                let path = self.session.as_ref().map(|s| s.path().to_path_buf());
                self.fail(path, e.kind(), e.to_string());
                return Err(e);
            }
        }
        self.set_state(PlaybackState::Playing);
        outcome
    }

    fn open_device(&mut self, device: Option<DeviceDescriptor>) -> Result<DeviceDescriptor> {
        self.device = device;
        let opened = self
            .output
            .open(self.device.as_ref(), Arc::clone(&self.buffer))?;
        if self.state() != PlaybackState::Playing {
            self.output.pause()?;
        }
        info!(device = %opened, "Output device selected");
        Ok(opened)
    }

    fn spectrum_clear(&self) {
        self.analyzer.slot().clear();
    }

    fn warn(&self, kind: ErrorKind, message: String) {
        warn!(%kind, %message, "Playback warning");
        self.emit(PlaybackEvent::Warning { kind, message });
    }

    // ===== Pipeline =====

    /// Decode, process and queue at most one block
    fn step(&mut self) -> Step {
        if self.state() != PlaybackState::Playing {
            return Step::Idle;
        }
        let Some(session) = self.session.as_mut() else {
            return Step::Idle;
        };

        let block = if let Some(held) = session.take_held() {
            held
        } else if session.is_decoding_finished() {
            return Step::Idle;
        } else {
            match session.source_mut().read_block() {
                Ok(Some(block)) => {
                    session.record_success();
                    self.process(block)
                }
                Ok(None) => {
                    debug!("End of stream reached");
                    session.set_decoding_finished(true);
                    return Step::Idle;
                }
                Err(e) => {
                    self.on_decode_failure(&e);
                    return Step::Produced;
                }
            }
        };

        let deadline = Instant::now() + PUSH_SLICE;
        let cancel = &self.shared.cancel;
        let commands = &self.commands;
        let pushed = self.buffer.push_until(block, || {
            cancel.load(Ordering::Acquire) || !commands.is_empty() || Instant::now() >= deadline
        });

        match pushed {
            Ok(()) => Step::Produced,
            Err(Rejected { block, error }) => {
                if let Some(session) = self.session.as_mut() {
                    session.hold(block);
                }
                match error {
                    PlaybackError::BufferFull { .. } => Step::Idle,
                    _ => Step::Produced,
                }
            }
        }
    }

    /// EQ, then analysis on the equalized signal, then volume and clipping
    fn process(&mut self, block: AudioBlock) -> AudioBlock {
        let block = self.equalizer.apply(block);
        self.analyzer.feed(&block);
        self.volume.process(block)
    }

    fn on_decode_failure(&mut self, e: &PlaybackError) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let failures = session.record_failure();
        let limit = self.config.max_consecutive_decode_failures;
        if failures >= limit {
            let path = session.path().to_path_buf();
            self.fail(
                Some(path),
                ErrorKind::DecodeBlockError,
                format!("{failures} consecutive blocks failed to decode: {e}"),
            );
        } else {
            self.warn(
                ErrorKind::DecodeBlockError,
                format!("Skipped undecodable block ({failures}/{limit}): {e}"),
            );
        }
    }

    fn check_end_of_track(&mut self) {
        if self.state() != PlaybackState::Playing {
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if !session.is_decoding_finished() || session.has_held() || !self.buffer.is_empty() {
            return;
        }

        let path = session.path().to_path_buf();
        info!(path = %path.display(), "Track finished");
        self.emit(PlaybackEvent::PositionChanged {
            position_ms: duration_ms(self.buffer.position()),
            duration_ms: session.duration_ms(),
        });
        self.emit(PlaybackEvent::TrackFinished { path });
        self.stop();
    }

    fn on_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Opened { device } => {
                info!(device = %device, "Output opened");
                self.emit(PlaybackEvent::DeviceChanged { device, gap_ms: 0 });
            }
            DeviceEvent::HotSwapped { from, to, gap } => {
                info!(from = %from, to = %to, ?gap, "Output moved to new default device");
                self.emit(PlaybackEvent::DeviceChanged {
                    device: to,
                    gap_ms: duration_ms(gap),
                });
            }
            DeviceEvent::HotSwapFailed { from, reason } => {
                let message = format!("Lost output device {}: {reason}", from.name);
                match self.session.as_ref() {
                    Some(session) => {
                        let path = Some(session.path().to_path_buf());
                        self.fail(path, ErrorKind::DeviceHotSwapFailure, message);
                    }
                    None => self.warn(ErrorKind::DeviceHotSwapFailure, message),
                }
            }
            DeviceEvent::StreamError { reason } => {
                self.warn(ErrorKind::DeviceUnavailable, reason);
            }
            DeviceEvent::Closed => debug!("Output closed"),
        }
    }

    /// Periodic position and underrun reporting
    fn tick(&mut self) {
        let now = Instant::now();
        if now < self.next_tick {
            return;
        }
        self.next_tick = now + self.config.position_interval();

        let underruns = self.buffer.underruns();
        if self.state() != PlaybackState::Playing {
            self.reported_underruns = underruns;
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };

        self.emit(PlaybackEvent::PositionChanged {
            position_ms: duration_ms(self.buffer.position()),
            duration_ms: session.duration_ms(),
        });

        let unreported = underruns.saturating_sub(self.reported_underruns);
        if unreported >= self.config.underrun_warning_threshold {
            self.reported_underruns = underruns;
            self.warn(
                ErrorKind::BufferUnderrun,
                format!("{unreported} buffer underruns, output is starving"),
            );
        }
    }
}

/// Frame index of `position` at `sample_rate`
fn frames_at(position: Duration, sample_rate: u32) -> u64 {
    (position.as_secs_f64() * f64::from(sample_rate)).round() as u64
}
