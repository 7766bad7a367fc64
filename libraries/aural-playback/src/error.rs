//! Error types for the playback engine

use crate::types::PlaybackState;
use aural_audio::AudioError;
use aural_core::{AuralError, ErrorKind};
use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Decoder or DSP error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Command not allowed in the current state
    #[error("Cannot {action} while {from:?}")]
    InvalidTransition {
        /// State the engine was in
        from: PlaybackState,
        /// Command that was refused
        action: &'static str,
    },

    /// No track is currently loaded
    #[error("No track loaded")]
    NoTrackLoaded,

    /// Output device missing or refused to open
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Output device rejected the stream format
    #[error("Device format unsupported: {0}")]
    DeviceFormatUnsupported(String),

    /// Buffer full and the push policy is fail-fast
    #[error("Playback buffer full ({capacity} blocks)")]
    BufferFull {
        /// Configured capacity
        capacity: usize,
    },

    /// A blocking push was interrupted by a transport command
    #[error("Push cancelled")]
    Cancelled,

    /// Invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Worker thread has exited
    #[error("Playback engine is shut down")]
    EngineShutDown,

    /// Shared core error
    #[error(transparent)]
    Core(#[from] AuralError),
}

impl PlaybackError {
    /// Taxonomy category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Audio(e) => match e {
                AudioError::FileUnreadable(_) | AudioError::Io(_) => ErrorKind::FileUnreadable,
                AudioError::UnsupportedFormat(_) | AudioError::Symphonia(_) => {
                    ErrorKind::UnsupportedFormat
                }
                AudioError::DecodeError(_) | AudioError::SeekError(_) => {
                    ErrorKind::DecodeBlockError
                }
                _ => ErrorKind::InvalidInput,
            },
            Self::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            Self::DeviceFormatUnsupported(_) => ErrorKind::DeviceFormatUnsupported,
            Self::Core(e) => e.kind(),
            Self::BufferFull { .. }
            | Self::Cancelled
            | Self::InvalidTransition { .. }
            | Self::NoTrackLoaded
            | Self::InvalidInput(_)
            | Self::EngineShutDown => ErrorKind::InvalidInput,
        }
    }
}

impl From<PlaybackError> for AuralError {
    fn from(err: PlaybackError) -> Self {
        match err {
            PlaybackError::Audio(e) => e.into(),
            PlaybackError::Core(e) => e,
            PlaybackError::DeviceUnavailable(msg) => AuralError::DeviceUnavailable(msg),
            PlaybackError::DeviceFormatUnsupported(msg) => {
                AuralError::DeviceFormatUnsupported(msg)
            }
            other => AuralError::InvalidInput(other.to_string()),
        }
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
