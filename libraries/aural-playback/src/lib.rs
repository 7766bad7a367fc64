//! Aural Playback - transport and pipeline orchestration
//!
//! Platform-agnostic playback engine for Aural.
//!
//! This crate provides:
//! - The transport state machine (load, play, pause, seek, stop, next)
//! - The bounded playback buffer between decoding and the device
//! - Volume control (logarithmic, 0-100%, mute) with output clipping
//! - Session snapshots and an event stream for UI and playlist collaborators
//!
//! # Architecture
//!
//! `aural-playback` has no device code. Audio output is provided through the
//! [`OutputStage`] trait (see `aural-audio-desktop`), and decoding through
//! [`SourceOpener`], so the whole engine can run against scripted sources in
//! tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use aural_playback::{EngineConfig, OutputStage, PlaybackEngine, PlaybackState};
//! use std::time::Duration;
//!
//! # fn run(output: Box<dyn OutputStage>) -> aural_playback::Result<()> {
//! let engine = PlaybackEngine::new(EngineConfig::default(), output)?;
//!
//! engine.load("/music/track.flac", Duration::ZERO)?;
//! engine.load_preset("rock")?;
//! engine.set_volume(80)?;
//!
//! if let Some(frame) = engine.take_spectrum_frame() {
//!     println!("{} bins at {:?}", frame.len(), frame.timestamp);
//! }
//!
//! engine.seek(Duration::from_secs(30))?;
//! engine.stop()?;
//! assert_eq!(engine.state(), PlaybackState::Stopped);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod buffer;
mod engine;
mod error;
mod events;
mod output;
mod session;
mod source;
mod types;
mod volume;

pub use buffer::{PlaybackBuffer, Rejected};
pub use engine::PlaybackEngine;
pub use error::{PlaybackError, Result};
pub use events::{EventBus, PlaybackEvent, EVENT_CAPACITY};
pub use output::OutputStage;
pub use session::SessionSnapshot;
pub use source::{BlockSource, DecoderOpener, SourceOpener};
pub use types::{EngineConfig, FailureReason, PlaybackState, PushPolicy};
pub use volume::Volume;
