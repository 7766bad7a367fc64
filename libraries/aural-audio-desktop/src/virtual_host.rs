//! In-process device host for tests and headless runs
//!
//! Devices are plain descriptors that can be plugged, unplugged and made
//! default at any time. Nothing pulls audio on its own: the caller plays
//! the part of the sound card by calling [`VirtualHost::pull`].

use crate::error::{OutputError, Result};
use crate::host::{sort_devices, DeviceHost};
use crate::renderer::RenderHandle;
use aural_core::{DeviceDescriptor, DeviceEvent};
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct StreamEntry {
    id: u64,
    device: DeviceDescriptor,
    render: RenderHandle,
    playing: bool,
}

#[derive(Debug, Default)]
struct HostState {
    devices: Vec<DeviceDescriptor>,
    default_id: Option<String>,
    streams: Vec<StreamEntry>,
    next_stream: u64,
    reject_next_open: Option<String>,
}

/// Scriptable device host
///
/// Cloning gives another handle to the same set of devices.
#[derive(Debug, Clone, Default)]
pub struct VirtualHost {
    state: Arc<Mutex<HostState>>,
}

/// A stream opened on a [`VirtualHost`] device
///
/// Dropping it unregisters the stream.
#[derive(Debug)]
pub struct VirtualStream {
    id: u64,
    state: Arc<Mutex<HostState>>,
}

impl Drop for VirtualStream {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.streams.retain(|s| s.id != self.id);
    }
}

fn lock(state: &Mutex<HostState>) -> MutexGuard<'_, HostState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl VirtualHost {
    /// Empty host with no devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a device; the first device added becomes the default
    pub fn add_device(&self, name: &str, sample_rate: u32, channels: u16) -> DeviceDescriptor {
        let mut state = lock(&self.state);
        let device = DeviceDescriptor::new(name, sample_rate, channels, false);
        state.devices.retain(|d| !d.same_device(&device));
        state.devices.push(device.clone());
        if state.default_id.is_none() {
            state.default_id = Some(device.id.clone());
        }
        device
    }

    /// Unplug a device
    ///
    /// Its streams stop pulling. When it was the default, no device is
    /// default afterwards.
    pub fn remove_device(&self, name: &str) {
        let mut state = lock(&self.state);
        state.devices.retain(|d| d.id != name);
        if state.default_id.as_deref() == Some(name) {
            state.default_id = None;
        }
        for stream in state.streams.iter_mut().filter(|s| s.device.id == name) {
            stream.playing = false;
        }
    }

    /// Make `name` the system default
    pub fn set_default(&self, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.devices.iter().any(|d| d.id == name) {
            return Err(OutputError::DeviceNotFound(name.to_string()));
        }
        state.default_id = Some(name.to_string());
        Ok(())
    }

    /// Refuse the next stream opened on `name` with a format error
    pub fn reject_next_open(&self, name: &str) {
        lock(&self.state).reject_next_open = Some(name.to_string());
    }

    /// Device whose stream is currently playing, if any
    pub fn playing_device(&self) -> Option<DeviceDescriptor> {
        lock(&self.state)
            .streams
            .iter()
            .find(|s| s.playing)
            .map(|s| s.device.clone())
    }

    /// Number of open streams
    pub fn stream_count(&self) -> usize {
        lock(&self.state).streams.len()
    }

    /// Pull `frames` frames from the playing stream, as its device would
    ///
    /// Returns the device and the interleaved samples, or `None` when no
    /// stream is playing.
    pub fn pull(&self, frames: usize) -> Option<(DeviceDescriptor, Vec<f32>)> {
        let (device, render) = {
            let state = lock(&self.state);
            let stream = state.streams.iter().find(|s| s.playing)?;
            (stream.device.clone(), stream.render.clone())
        };
        let mut out = vec![0.0; frames * usize::from(device.channels)];
        render.render(&mut out);
        Some((device, out))
    }

    fn set_playing(&self, stream: &VirtualStream, playing: bool) -> Result<()> {
        let mut state = lock(&self.state);
        let present: Vec<String> = state.devices.iter().map(|d| d.id.clone()).collect();
        let entry = state
            .streams
            .iter_mut()
            .find(|s| s.id == stream.id)
            .ok_or(OutputError::NotOpen)?;
        if playing && !present.contains(&entry.device.id) {
            return Err(OutputError::Play(format!("{} was unplugged", entry.device.name)));
        }
        entry.playing = playing;
        Ok(())
    }
}

impl DeviceHost for VirtualHost {
    type Stream = VirtualStream;

    fn devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let state = lock(&self.state);
        let mut devices: Vec<_> = state
            .devices
            .iter()
            .map(|d| DeviceDescriptor {
                is_default: state.default_id.as_deref() == Some(d.id.as_str()),
                ..d.clone()
            })
            .collect();
        sort_devices(&mut devices);
        Ok(devices)
    }

    fn default_device(&self) -> Result<Option<DeviceDescriptor>> {
        Ok(self.devices()?.into_iter().find(|d| d.is_default))
    }

    fn build_stream(
        &self,
        device: &DeviceDescriptor,
        render: RenderHandle,
        _errors: Sender<DeviceEvent>,
    ) -> Result<Self::Stream> {
        let mut state = lock(&self.state);
        if state.reject_next_open.as_deref() == Some(device.id.as_str()) {
            state.reject_next_open = None;
            return Err(OutputError::FormatUnsupported(format!(
                "{} refused {} Hz / {} ch",
                device.name, device.sample_rate, device.channels
            )));
        }
        if !state.devices.iter().any(|d| d.same_device(device)) {
            return Err(OutputError::DeviceNotFound(device.name.clone()));
        }

        state.next_stream += 1;
        let id = state.next_stream;
        state.streams.push(StreamEntry {
            id,
            device: device.clone(),
            render,
            playing: false,
        });
        Ok(VirtualStream {
            id,
            state: Arc::clone(&self.state),
        })
    }

    fn play(&self, stream: &Self::Stream) -> Result<()> {
        self.set_playing(stream, true)
    }

    fn pause(&self, stream: &Self::Stream) -> Result<()> {
        self.set_playing(stream, false)
    }
}
