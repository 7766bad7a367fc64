/// Player error types
use thiserror::Error;

/// Result type for player operations
pub type Result<T> = std::result::Result<T, PlayerError>;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown preset '{0}'")]
    UnknownPreset(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error(transparent)]
    Audio(#[from] aural_audio::AudioError),

    #[error(transparent)]
    Playback(#[from] aural_playback::PlaybackError),

    #[error(transparent)]
    Output(#[from] aural_audio_desktop::OutputError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
