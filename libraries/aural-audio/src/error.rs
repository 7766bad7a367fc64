/// Audio-specific errors
use aural_core::AuralError;
use thiserror::Error;

/// Result type alias using `AudioError`
pub type Result<T> = std::result::Result<T, AudioError>;

/// Audio error types
#[derive(Error, Debug)]
pub enum AudioError {
    /// File not found or not readable
    #[error("File unreadable: {0}")]
    FileUnreadable(String),

    /// Signature matched no supported decoder family
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A single block failed to decode; the stream is still usable
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Seek error
    #[error("Seek error: {0}")]
    SeekError(String),

    /// No file is currently open
    #[error("No file open for streaming decode")]
    NoFileOpen,

    /// Equalizer band index outside 0..10
    #[error("Invalid band index: {0}")]
    InvalidBand(usize),

    /// Gain is not a finite number
    #[error("Invalid gain: {0} dB")]
    InvalidGain(f32),

    /// Preset failed validation
    #[error("Invalid preset: {0}")]
    InvalidPreset(String),

    /// Analyzer or pipeline settings out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resampler setup or processing failed
    #[error("Resampling error: {0}")]
    Resampling(String),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Symphonia error raised while opening a stream
    #[error("Symphonia error: {0}")]
    Symphonia(String),
}

impl From<AudioError> for AuralError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::FileUnreadable(msg) => AuralError::FileUnreadable(msg),
            AudioError::Io(e) => AuralError::FileUnreadable(e.to_string()),
            AudioError::UnsupportedFormat(msg) | AudioError::Symphonia(msg) => {
                AuralError::UnsupportedFormat(msg)
            }
            AudioError::DecodeError(msg) | AudioError::SeekError(msg) => {
                AuralError::DecodeBlock(msg)
            }
            AudioError::NoFileOpen => AuralError::invalid_input("no file open"),
            AudioError::InvalidBand(index) => {
                AuralError::invalid_input(format!("band index {} out of range", index))
            }
            AudioError::InvalidGain(gain) => {
                AuralError::invalid_input(format!("gain {} dB is not finite", gain))
            }
            AudioError::InvalidPreset(msg)
            | AudioError::InvalidConfig(msg)
            | AudioError::Resampling(msg) => {
                AuralError::InvalidInput(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aural_core::ErrorKind;

    #[test]
    fn maps_onto_taxonomy() {
        let cases = [
            (AudioError::FileUnreadable("x".into()), ErrorKind::FileUnreadable),
            (AudioError::UnsupportedFormat("x".into()), ErrorKind::UnsupportedFormat),
            (AudioError::DecodeError("x".into()), ErrorKind::DecodeBlockError),
            (AudioError::InvalidBand(11), ErrorKind::InvalidInput),
            (AudioError::InvalidConfig("x".into()), ErrorKind::InvalidInput),
        ];
        for (err, kind) in cases {
            assert_eq!(AuralError::from(err).kind(), kind);
        }
    }
}
