//! Device Output Manager
//!
//! Owns the live device stream on a dedicated output thread. The same
//! thread polls the host for default-device changes and moves the stream
//! when the default changes: the new stream is built and made current
//! before the old one is dropped, so the device callback never waits on
//! the swap. Blocks already queued in the playback buffer play on the new
//! device.

use crate::config::OutputConfig;
use crate::error::{OutputError, Result};
use crate::host::DeviceHost;
use crate::renderer::{RenderHandle, Renderer};
use aural_audio::Resampler;
use aural_core::{DeviceDescriptor, DeviceEvent};
use aural_playback::{OutputStage, PlaybackBuffer};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Commands from the API side to the output thread
enum Command {
    Open {
        device: Option<DeviceDescriptor>,
        buffer: Arc<PlaybackBuffer>,
        reply: Sender<Result<DeviceDescriptor>>,
    },
    Pause {
        reply: Sender<Result<()>>,
    },
    Resume {
        reply: Sender<Result<()>>,
    },
    Devices {
        reply: Sender<Result<Vec<DeviceDescriptor>>>,
    },
    Close {
        reply: Sender<()>,
    },
    Shutdown,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live connection to an audio output device
///
/// The host type is fixed at construction; everything afterwards goes
/// through the output thread.
pub struct DeviceOutputManager {
    commands: Sender<Command>,
    events: Receiver<DeviceEvent>,
    active: Arc<Mutex<Option<DeviceDescriptor>>>,
    buffer: Mutex<Option<Arc<PlaybackBuffer>>>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DeviceOutputManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceOutputManager")
            .field("active", &*lock(&self.active))
            .finish_non_exhaustive()
    }
}

impl DeviceOutputManager {
    /// Start the output thread on `host`
    ///
    /// No stream is opened until [`open`](Self::open).
    pub fn new<H: DeviceHost>(host: H, config: OutputConfig) -> Result<Self> {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let active = Arc::new(Mutex::new(None));
        let shared_active = Arc::clone(&active);

        // Streams need not be Send, so all stream state is created on the thread
        let thread = thread::Builder::new()
            .name("aural-output".to_string())
            .spawn(move || {
                let (resampler_tx, resampler_rx) = bounded(1);
                let mut renderer = Renderer::new(48_000, 2);
                renderer.request_resamplers(resampler_tx);
                let output = OutputThread {
                    renderer: Arc::new(Mutex::new(renderer)),
                    host,
                    config,
                    events: event_tx,
                    current: Arc::new(AtomicU64::new(0)),
                    next_stream: 0,
                    stream: None,
                    active: shared_active,
                    requested: None,
                    playing: false,
                };
                output.run(&command_rx, &resampler_rx);
            })?;

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            active,
            buffer: Mutex::new(None),
            thread: Some(thread),
        })
    }

    fn request<T>(&self, command: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send(command(reply_tx))
            .map_err(|_| OutputError::ShutDown)?;
        reply_rx.recv().map_err(|_| OutputError::ShutDown)
    }

    /// Open a stream that pulls from `buffer`
    ///
    /// With `None` the system default is used and followed when it changes.
    /// A named device is kept until it disappears. Opening while a stream
    /// is live replaces it. The stream starts playing.
    ///
    /// # Errors
    /// `DeviceNotFound`, `NoDefaultDevice`, `FormatUnsupported` or a
    /// stream error from the host.
    pub fn open(
        &self,
        device: Option<&DeviceDescriptor>,
        buffer: Arc<PlaybackBuffer>,
    ) -> Result<DeviceDescriptor> {
        *lock(&self.buffer) = Some(Arc::clone(&buffer));
        let device = device.cloned();
        self.request(|reply| Command::Open {
            device,
            buffer,
            reply,
        })?
    }

    /// Queue one block of mixed PCM for the device
    ///
    /// Honours the buffer's push policy.
    pub fn write(&self, block: aural_core::AudioBlock) -> Result<()> {
        let buffer = lock(&self.buffer).clone().ok_or(OutputError::NotOpen)?;
        buffer.push(block)?;
        Ok(())
    }

    /// Stop pulling; queued blocks stay queued
    pub fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply })?
    }

    /// Resume pulling
    pub fn resume(&self) -> Result<()> {
        self.request(|reply| Command::Resume { reply })?
    }

    /// Close the stream
    pub fn close(&self) {
        *lock(&self.buffer) = None;
        let _ = self.request(|reply| Command::Close { reply });
    }

    /// Output devices currently present, default first
    pub fn devices(&self) -> Result<Vec<DeviceDescriptor>> {
        self.request(|reply| Command::Devices { reply })?
    }

    /// Device currently playing
    pub fn active_device(&self) -> Option<DeviceDescriptor> {
        lock(&self.active).clone()
    }

    /// Next pending device notification
    pub fn poll_event(&self) -> Option<DeviceEvent> {
        self.events.try_recv().ok()
    }

    /// All device notifications, for callers that want to block on them
    pub fn events(&self) -> Receiver<DeviceEvent> {
        self.events.clone()
    }
}

impl Drop for DeviceOutputManager {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Output thread panicked");
            }
        }
    }
}

impl OutputStage for DeviceOutputManager {
    fn open(
        &mut self,
        device: Option<&DeviceDescriptor>,
        buffer: Arc<PlaybackBuffer>,
    ) -> aural_playback::Result<DeviceDescriptor> {
        Ok(DeviceOutputManager::open(self, device, buffer)?)
    }

    fn pause(&mut self) -> aural_playback::Result<()> {
        Ok(DeviceOutputManager::pause(self)?)
    }

    fn resume(&mut self) -> aural_playback::Result<()> {
        Ok(DeviceOutputManager::resume(self)?)
    }

    fn close(&mut self) {
        DeviceOutputManager::close(self);
    }

    fn poll_event(&mut self) -> Option<DeviceEvent> {
        DeviceOutputManager::poll_event(self)
    }

    fn active_device(&self) -> Option<DeviceDescriptor> {
        DeviceOutputManager::active_device(self)
    }
}

/// A stream and the device it plays on
struct LiveStream<S> {
    device: DeviceDescriptor,
    stream: S,
}

/// State owned by the output thread
struct OutputThread<H: DeviceHost> {
    host: H,
    config: OutputConfig,
    events: Sender<DeviceEvent>,
    renderer: Arc<Mutex<Renderer>>,
    /// Id of the stream allowed to render
    current: Arc<AtomicU64>,
    next_stream: u64,
    stream: Option<LiveStream<H::Stream>>,
    active: Arc<Mutex<Option<DeviceDescriptor>>>,
    /// Explicitly chosen device; `None` follows the default
    requested: Option<DeviceDescriptor>,
    playing: bool,
}

impl<H: DeviceHost> OutputThread<H> {
    fn run(mut self, commands: &Receiver<Command>, resampler_requests: &Receiver<u32>) {
        debug!("Output thread started");
        let poll = self.config.poll_interval();
        let mut next_poll = Instant::now() + poll;

        loop {
            let timeout = next_poll.saturating_duration_since(Instant::now());
            select! {
                recv(commands) -> command => match command {
                    Ok(Command::Shutdown) | Err(_) => break,
                    Ok(command) => self.handle(command),
                },
                recv(resampler_requests) -> rate => {
                    if let Ok(rate) = rate {
                        self.prepare_resampler(rate);
                    }
                },
                default(timeout) => {
                    self.monitor();
                    next_poll = Instant::now() + poll;
                },
            }
        }

        self.close();
        debug!("Output thread stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Open {
                device,
                buffer,
                reply,
            } => {
                let _ = reply.send(self.open(device, buffer));
            }
            Command::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            Command::Resume { reply } => {
                let _ = reply.send(self.resume());
            }
            Command::Devices { reply } => {
                let _ = reply.send(self.host.devices());
            }
            Command::Close { reply } => {
                self.close();
                let _ = reply.send(());
            }
            Command::Shutdown => {}
        }
    }

    fn emit(&self, event: DeviceEvent) {
        let _ = self.events.send(event);
    }

    fn set_active(&mut self, stream: Option<LiveStream<H::Stream>>) {
        *lock(&self.active) = stream.as_ref().map(|s| s.device.clone());
        // Dropping the previous stream closes it
        self.stream = stream;
    }

    /// Find the device to open: the requested one, or the default
    fn resolve(&self, device: Option<&DeviceDescriptor>) -> Result<DeviceDescriptor> {
        let resolved = match device {
            Some(wanted) => self
                .host
                .devices()?
                .into_iter()
                .find(|d| d.same_device(wanted) || d.name == wanted.name)
                .ok_or_else(|| OutputError::DeviceNotFound(wanted.name.clone()))?,
            None => self
                .host
                .default_device()?
                .ok_or(OutputError::NoDefaultDevice)?,
        };
        if resolved.sample_rate == 0 || resolved.channels == 0 {
            return Err(OutputError::FormatUnsupported(format!(
                "{} reports {} Hz / {} channels",
                resolved.name, resolved.sample_rate, resolved.channels
            )));
        }
        Ok(resolved)
    }

    /// Build a stream on `device` and make it the one that renders
    fn start_stream(
        &mut self,
        device: &DeviceDescriptor,
        buffer: Option<Arc<PlaybackBuffer>>,
    ) -> Result<LiveStream<H::Stream>> {
        self.next_stream += 1;
        let id = self.next_stream;
        let handle = RenderHandle::new(Arc::clone(&self.renderer), Arc::clone(&self.current), id);
        let stream = self.host.build_stream(device, handle, self.events.clone())?;
        if self.playing {
            self.host.play(&stream)?;
        }

        let source_rate = match &buffer {
            Some(buffer) => Some(buffer.sample_rate()).filter(|rate| *rate != 0),
            None => lock(&self.renderer).source_rate(),
        };
        let resampler = source_rate
            .filter(|rate| *rate != device.sample_rate)
            .and_then(|rate| self.build_resampler(rate, device.sample_rate, device.channels));

        // Callbacks see silence while the renderer is held
        let mut renderer = lock(&self.renderer);
        if let Some(buffer) = buffer {
            renderer.attach(buffer);
        }
        renderer.reconfigure(device.sample_rate, device.channels);
        if let Some(resampler) = resampler {
            renderer.install_resampler(resampler);
        }
        self.current.store(id, Ordering::Release);
        drop(renderer);

        Ok(LiveStream {
            device: device.clone(),
            stream,
        })
    }

    fn build_resampler(&self, source_rate: u32, device_rate: u32, channels: u16) -> Option<Resampler> {
        match Resampler::new(source_rate, device_rate, usize::from(channels), self.config.resampling) {
            Ok(resampler) => Some(resampler),
            Err(e) => {
                error!(error = %e, source_rate, device_rate, "Cannot resample for device");
                None
            }
        }
    }

    /// Build the resampler the device callback asked for
    fn prepare_resampler(&self, source_rate: u32) {
        let (device_rate, channels) = {
            let renderer = lock(&self.renderer);
            if !renderer.needs_resampler(source_rate) {
                return;
            }
            (renderer.device_rate(), renderer.device_channels())
        };
        debug!(source_rate, device_rate, "Preparing resampler");
        if let Some(resampler) = self.build_resampler(source_rate, device_rate, channels) {
            lock(&self.renderer).install_resampler(resampler);
        }
    }

    fn open(
        &mut self,
        device: Option<DeviceDescriptor>,
        buffer: Arc<PlaybackBuffer>,
    ) -> Result<DeviceDescriptor> {
        let target = self.resolve(device.as_ref())?;
        let was_playing = std::mem::replace(&mut self.playing, true);
        let stream = match self.start_stream(&target, Some(buffer)) {
            Ok(stream) => stream,
            Err(e) => {
                self.playing = was_playing;
                return Err(e);
            }
        };
        self.set_active(Some(stream));
        self.requested = device;

        info!(device = %target, "Output stream opened");
        self.emit(DeviceEvent::Opened {
            device: target.clone(),
        });
        Ok(target)
    }

    fn pause(&mut self) -> Result<()> {
        self.playing = false;
        match &self.stream {
            Some(live) => self.host.pause(&live.stream),
            None => Ok(()),
        }
    }

    fn resume(&mut self) -> Result<()> {
        let live = self.stream.as_ref().ok_or(OutputError::NotOpen)?;
        self.host.play(&live.stream)?;
        self.playing = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.is_none() {
            return;
        }
        self.current.store(0, Ordering::Release);
        lock(&self.renderer).detach();
        self.set_active(None);
        self.playing = false;
        info!("Output stream closed");
        self.emit(DeviceEvent::Closed);
    }

    /// Check whether the stream's device is still the right one
    fn monitor(&mut self) {
        let Some(live) = &self.stream else {
            return;
        };
        let from = live.device.clone();

        if let Some(wanted) = self.requested.clone() {
            match self.host.devices() {
                Ok(devices) if devices.iter().any(|d| d.same_device(&wanted)) => {}
                Ok(_) => self.swap_failed(from, format!("{} was disconnected", wanted.name)),
                Err(e) => debug!(error = %e, "Device poll failed"),
            }
            return;
        }

        match self.host.default_device() {
            Ok(Some(default)) if !default.same_device(&from) => self.hot_swap(from, default),
            Ok(Some(_)) => {}
            Ok(None) => self.swap_failed(from, "no default output device".to_string()),
            Err(e) => debug!(error = %e, "Device poll failed"),
        }
    }

    /// Move the live stream to `to`
    fn hot_swap(&mut self, from: DeviceDescriptor, to: DeviceDescriptor) {
        info!(from = %from, to = %to, "Default output device changed");
        let started = Instant::now();

        if to.sample_rate == 0 || to.channels == 0 {
            self.swap_failed(from, format!("{} reports no usable format", to.name));
            return;
        }
        let stream = match self.start_stream(&to, None) {
            Ok(stream) => stream,
            Err(e) => {
                self.swap_failed(from, e.to_string());
                return;
            }
        };
        self.set_active(Some(stream));

        let gap = started.elapsed();
        if gap > self.config.max_swap_gap() {
            warn!(
                gap_ms = gap.as_millis(),
                max_ms = self.config.max_swap_gap_ms,
                "Hot-swap exceeded gap budget"
            );
        }
        self.emit(DeviceEvent::HotSwapped { from, to, gap });
    }

    fn swap_failed(&mut self, from: DeviceDescriptor, reason: String) {
        error!(device = %from, %reason, "Output device lost");
        self.emit(DeviceEvent::HotSwapFailed { from, reason });
        self.close();
    }
}
