/// Device output errors
use aural_core::{AuralError, ErrorKind};
use aural_playback::PlaybackError;
use thiserror::Error;

/// Result type for device output operations
pub type Result<T> = std::result::Result<T, OutputError>;

/// Device output errors
#[derive(Debug, Error)]
pub enum OutputError {
    /// Audio host (backend) could not be initialized
    #[error("Audio host unavailable: {0}")]
    HostUnavailable(String),

    /// No default output device
    #[error("No default output device")]
    NoDefaultDevice,

    /// Named device not present
    #[error("Audio device '{0}' not found")]
    DeviceNotFound(String),

    /// Device refused the stream configuration
    #[error("Device format unsupported: {0}")]
    FormatUnsupported(String),

    /// Failed to build output stream
    #[error("Failed to build output stream: {0}")]
    StreamBuild(String),

    /// Failed to start stream
    #[error("Failed to play stream: {0}")]
    Play(String),

    /// Failed to pause stream
    #[error("Failed to pause stream: {0}")]
    Pause(String),

    /// Failed to enumerate devices
    #[error("Failed to enumerate audio devices: {0}")]
    Enumeration(String),

    /// Operation needs an open stream
    #[error("No output stream is open")]
    NotOpen,

    /// Output thread is gone
    #[error("Output thread has shut down")]
    ShutDown,

    /// Playback buffer refused a block
    #[error("Playback buffer rejected block: {0}")]
    Buffer(String),

    /// Thread spawn failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OutputError {
    /// Taxonomy category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FormatUnsupported(_) => ErrorKind::DeviceFormatUnsupported,
            Self::NotOpen | Self::ShutDown | Self::Buffer(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::DeviceUnavailable,
        }
    }
}

impl From<cpal::BuildStreamError> for OutputError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::StreamConfigNotSupported => {
                OutputError::FormatUnsupported(err.to_string())
            }
            _ => OutputError::StreamBuild(err.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for OutputError {
    fn from(err: cpal::PlayStreamError) -> Self {
        OutputError::Play(err.to_string())
    }
}

impl From<cpal::PauseStreamError> for OutputError {
    fn from(err: cpal::PauseStreamError) -> Self {
        OutputError::Pause(err.to_string())
    }
}

impl From<cpal::DevicesError> for OutputError {
    fn from(err: cpal::DevicesError) -> Self {
        OutputError::Enumeration(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for OutputError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
                OutputError::FormatUnsupported(err.to_string())
            }
            _ => OutputError::StreamBuild(err.to_string()),
        }
    }
}

impl From<PlaybackError> for OutputError {
    fn from(err: PlaybackError) -> Self {
        OutputError::Buffer(err.to_string())
    }
}

impl From<OutputError> for PlaybackError {
    fn from(err: OutputError) -> Self {
        match err.kind() {
            ErrorKind::DeviceFormatUnsupported => {
                PlaybackError::DeviceFormatUnsupported(err.to_string())
            }
            ErrorKind::InvalidInput => PlaybackError::InvalidInput(err.to_string()),
            _ => PlaybackError::DeviceUnavailable(err.to_string()),
        }
    }
}

impl From<OutputError> for AuralError {
    fn from(err: OutputError) -> Self {
        match err.kind() {
            ErrorKind::DeviceFormatUnsupported => {
                AuralError::DeviceFormatUnsupported(err.to_string())
            }
            ErrorKind::InvalidInput => AuralError::InvalidInput(err.to_string()),
            _ => AuralError::DeviceUnavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejection_is_a_format_error() {
        let err = OutputError::from(cpal::BuildStreamError::StreamConfigNotSupported);
        assert_eq!(err.kind(), ErrorKind::DeviceFormatUnsupported);
        assert!(matches!(
            PlaybackError::from(err),
            PlaybackError::DeviceFormatUnsupported(_)
        ));
    }

    #[test]
    fn missing_device_is_unavailable() {
        let err = OutputError::DeviceNotFound("USB DAC".into());
        assert_eq!(err.to_string(), "Audio device 'USB DAC' not found");
        assert_eq!(AuralError::from(err).kind(), ErrorKind::DeviceUnavailable);
    }
}
