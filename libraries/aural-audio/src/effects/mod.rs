//! Audio effects processing
//!
//! All effects operate on f32 samples in [-1.0, 1.0] range, one
//! [`aural_core::AudioBlock`] at a time.
//!
//! Available effects:
//! - **GraphicEq**: 10-band graphic equalizer with queued, block-aligned updates

mod graphic_eq;

pub use graphic_eq::{EqUpdate, EqualizerHandle, GraphicEq, BAND_Q};
