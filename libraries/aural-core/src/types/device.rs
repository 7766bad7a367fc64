/// Output device domain types
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An audio output device as seen by the output stage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Stable identifier within the host (the device name for cpal)
    pub id: String,

    /// Display name (e.g., "Built-in Output", "USB DAC")
    pub name: String,

    /// Native sample rate (Hz)
    pub sample_rate: u32,

    /// Number of output channels
    pub channels: u16,

    /// Is this the system default output device?
    pub is_default: bool,
}

impl DeviceDescriptor {
    /// Create a descriptor whose id and name are the same string
    pub fn new(name: impl Into<String>, sample_rate: u32, channels: u16, is_default: bool) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            sample_rate,
            channels,
            is_default,
        }
    }

    /// Whether two descriptors refer to the same physical device
    ///
    /// The default flag and format are ignored, both change over time.
    pub fn same_device(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} Hz, {} ch{})",
            self.name,
            self.sample_rate,
            self.channels,
            if self.is_default { ", default" } else { "" }
        )
    }
}

/// Notifications raised by the device output stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceEvent {
    /// A stream was opened on a device
    Opened {
        /// The device now playing
        device: DeviceDescriptor,
    },

    /// The system default device changed and the stream moved to it
    HotSwapped {
        /// Device playback left
        from: DeviceDescriptor,
        /// Device playback moved to
        to: DeviceDescriptor,
        /// Time between detecting the change and the new stream running
        gap: Duration,
    },

    /// The system default device changed but the new stream could not start
    HotSwapFailed {
        /// Device playback was on
        from: DeviceDescriptor,
        /// Human-readable reason
        reason: String,
    },

    /// The stream reported a runtime error
    StreamError {
        /// Human-readable reason
        reason: String,
    },

    /// The stream was closed
    Closed,
}
