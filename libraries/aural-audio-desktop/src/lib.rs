//! Desktop audio output for Aural
//!
//! Implements the device side of playback: a [`DeviceOutputManager`] that
//! owns the live stream, converts blocks to the device format and follows
//! the system default output device across changes.
//!
//! # Features
//!
//! - Cross-platform output using CPAL ([`CpalHost`])
//! - Default-device monitoring with stream hot-swap
//! - Automatic sample rate conversion and channel mapping per device
//! - A software host ([`VirtualHost`]) for tests and headless runs
//!
//! # Example
//!
//! ```no_run
//! use aural_audio_desktop::{CpalHost, DeviceOutputManager, OutputConfig};
//! use aural_playback::{EngineConfig, PlaybackEngine};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let output = DeviceOutputManager::new(CpalHost::new(), OutputConfig::default())?;
//! let engine = PlaybackEngine::new(EngineConfig::default(), Box::new(output))?;
//!
//! engine.load("/music/track.mp3", Duration::ZERO)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod config;
mod cpal_host;
mod error;
mod host;
mod manager;
mod renderer;
mod virtual_host;

pub use config::OutputConfig;
pub use cpal_host::CpalHost;
pub use error::{OutputError, Result};
pub use host::{sort_devices, DeviceHost};
pub use manager::DeviceOutputManager;
pub use renderer::{RenderHandle, Renderer};
pub use virtual_host::{VirtualHost, VirtualStream};
