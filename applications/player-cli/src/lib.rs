//! Aural Player - command-line front end for the Aural playback core
//!
//! The binary wires a [`PlaybackEngine`](aural_playback::PlaybackEngine) to
//! the system's default output device and drives it from stdin. The pieces
//! that do not need a device live here so they can be tested on their own:
//! configuration loading, command parsing and the offline analyzer.

#![forbid(unsafe_code)]

pub mod analyze;
pub mod commands;
pub mod config;
pub mod error;

pub use analyze::{analyze, AnalysisReport};
pub use commands::Command;
pub use config::{PlayerConfig, PresetEntry};
pub use error::{PlayerError, Result};
