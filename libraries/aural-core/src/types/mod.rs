mod audio;
mod device;
mod equalizer;
mod spectrum;

pub use audio::AudioBlock;
pub use device::{DeviceDescriptor, DeviceEvent};
pub use equalizer::{EqualizerPreset, BAND_COUNT, BAND_FREQUENCIES, MAX_GAIN_DB, MIN_GAIN_DB};
pub use spectrum::SpectrumFrame;
