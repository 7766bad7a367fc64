//! Audio host abstraction
//!
//! The output manager talks to devices only through [`DeviceHost`], so the
//! same hot-swap logic drives real cpal devices and the scriptable
//! [`VirtualHost`](crate::VirtualHost) used in tests.

use crate::error::Result;
use crate::renderer::RenderHandle;
use aural_core::{DeviceDescriptor, DeviceEvent};
use crossbeam_channel::Sender;

/// A source of output devices and streams
pub trait DeviceHost: Send + 'static {
    /// A running (or paused) output stream
    ///
    /// Streams stay on the output thread for their whole life and need not
    /// be `Send`.
    type Stream;

    /// Output devices currently present, default device first
    fn devices(&self) -> Result<Vec<DeviceDescriptor>>;

    /// The system default output device, if there is one
    fn default_device(&self) -> Result<Option<DeviceDescriptor>>;

    /// Build a stream on `device` in its native format
    ///
    /// The stream calls `render` for every buffer the device asks for and
    /// reports runtime failures on `errors`. It starts paused.
    fn build_stream(
        &self,
        device: &DeviceDescriptor,
        render: RenderHandle,
        errors: Sender<DeviceEvent>,
    ) -> Result<Self::Stream>;

    /// Start or continue pulling audio
    fn play(&self, stream: &Self::Stream) -> Result<()>;

    /// Stop pulling audio, keeping the stream open
    fn pause(&self, stream: &Self::Stream) -> Result<()>;
}

/// Order devices the way they are presented: default first, then by name
pub fn sort_devices(devices: &mut [DeviceDescriptor]) {
    devices.sort_by(|a, b| match (a.is_default, b.is_default) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });
}
