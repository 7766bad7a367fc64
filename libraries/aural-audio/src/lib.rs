//! Aural Audio
//!
//! Signal processing for the Aural playback core.
//!
//! This crate provides:
//! - Streaming decode via Symphonia, selected by file signature
//!   (MPEG audio, WAV/AIFF PCM, FLAC, Ogg Vorbis)
//! - A 10-band graphic equalizer with block-boundary gain updates
//! - A spectrum analyzer with a newest-wins frame slot
//! - Sample rate conversion for devices that run at a different rate
//!
//! # Example: Decoding Audio
//!
//! ```rust,no_run
//! use aural_audio::Decoder;
//! use std::path::Path;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut decoder = Decoder::open(Path::new("/music/song.flac"), 1024)?;
//! println!("{} Hz, family {:?}", decoder.properties().sample_rate, decoder.family());
//!
//! while let Some(block) = decoder.read_block()? {
//!     println!("block at frame {:?}", block.frame_offset);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Equalizer and Analyzer
//!
//! ```rust
//! use aural_audio::{effects::GraphicEq, SpectrumAnalyzer, SpectrumConfig};
//! use aural_core::{AudioBlock, EqualizerPreset};
//!
//! let mut eq = GraphicEq::new(44_100, 2);
//! let handle = eq.handle();
//! handle.load_preset(&EqualizerPreset::builtin("Rock").unwrap());
//!
//! let mut analyzer = SpectrumAnalyzer::new(SpectrumConfig::default());
//! let block = eq.apply(AudioBlock::new(vec![0.0; 4096], 44_100, 2, 0));
//! analyzer.feed(&block);
//! assert!(analyzer.slot().take().is_some());
//! ```

pub mod analyzer;
mod decoder;
pub mod effects;
mod error;
pub mod resampling;

pub use analyzer::{SpectrumAnalyzer, SpectrumConfig, SpectrumSlot};
pub use decoder::{Decoder, DecoderFamily, StreamProperties, OUTPUT_CHANNELS};
pub use effects::{EqUpdate, EqualizerHandle, GraphicEq};
pub use error::{AudioError, Result};
pub use resampling::{Resampler, ResamplingQuality};
