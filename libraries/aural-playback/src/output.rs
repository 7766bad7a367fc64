//! Output stage seam
//!
//! The engine never talks to a device directly. A platform crate implements
//! [`OutputStage`] by pulling from the shared [`PlaybackBuffer`] on its own
//! real-time thread and reporting device changes through [`DeviceEvent`]s.

use crate::buffer::PlaybackBuffer;
use crate::error::Result;
use aural_core::{DeviceDescriptor, DeviceEvent};
use std::sync::Arc;

/// Device output driven by the playback engine
pub trait OutputStage: Send {
    /// Start pulling from `buffer` on `device`, or the system default
    ///
    /// Returns the device actually opened. Opening while already open moves
    /// the stream to the new device.
    ///
    /// # Errors
    /// `DeviceUnavailable` or `DeviceFormatUnsupported`.
    fn open(
        &mut self,
        device: Option<&DeviceDescriptor>,
        buffer: Arc<PlaybackBuffer>,
    ) -> Result<DeviceDescriptor>;

    /// Stop pulling; queued blocks stay in the buffer
    fn pause(&mut self) -> Result<()>;

    /// Resume pulling
    fn resume(&mut self) -> Result<()>;

    /// Close the stream
    fn close(&mut self);

    /// Next pending device notification, without blocking
    fn poll_event(&mut self) -> Option<DeviceEvent>;

    /// Device currently playing, if open
    fn active_device(&self) -> Option<DeviceDescriptor>;
}
