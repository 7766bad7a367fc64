//! Aural Core
//!
//! Platform-agnostic domain types and the error taxonomy shared by every
//! Aural crate.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Pipeline Types**: `AudioBlock`, `SpectrumFrame`, `DeviceDescriptor`
//! - **Equalizer Model**: the 10 fixed bands and `EqualizerPreset`
//! - **Error Handling**: unified `AuralError`, `ErrorKind` and `Result` types
//!
//! # Example
//!
//! ```rust
//! use aural_core::{AudioBlock, EqualizerPreset};
//!
//! // One block of stereo silence at 44.1 kHz
//! let block = AudioBlock::silence(1024, 44_100, 2);
//! assert_eq!(block.frames(), 1024);
//!
//! // Presets are looked up by name and validated on load
//! let rock = EqualizerPreset::builtin("rock").unwrap();
//! assert_eq!(rock.gains().len(), 10);
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod types;

pub use error::{AuralError, ErrorKind, Result};
pub use types::{
    AudioBlock, DeviceDescriptor, DeviceEvent, EqualizerPreset, SpectrumFrame, BAND_COUNT,
    BAND_FREQUENCIES, MAX_GAIN_DB, MIN_GAIN_DB,
};
