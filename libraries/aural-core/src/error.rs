/// Core error types for Aural
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using `AuralError`
pub type Result<T> = std::result::Result<T, AuralError>;

/// Error categories surfaced to callers and UI collaborators
///
/// Every error raised anywhere in the pipeline maps onto exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// File signature or codec is not one of the supported families
    UnsupportedFormat,
    /// File is missing or cannot be read
    FileUnreadable,
    /// A single block failed to decode (recoverable, block skipped)
    DecodeBlockError,
    /// Output device missing or refused to open
    DeviceUnavailable,
    /// Device cannot run the requested stream format
    DeviceFormatUnsupported,
    /// Output needed a block and none was queued (recoverable, counted)
    BufferUnderrun,
    /// Switching to a new default device failed
    DeviceHotSwapFailure,
    /// Caller supplied an invalid argument or issued an illegal command
    InvalidInput,
}

impl ErrorKind {
    /// Whether this kind is absorbed locally instead of failing the track
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DecodeBlockError | Self::BufferUnderrun | Self::InvalidInput)
    }

    /// Stable identifier used in events and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat => "unsupported_format",
            Self::FileUnreadable => "file_unreadable",
            Self::DecodeBlockError => "decode_block_error",
            Self::DeviceUnavailable => "device_unavailable",
            Self::DeviceFormatUnsupported => "device_format_unsupported",
            Self::BufferUnderrun => "buffer_underrun",
            Self::DeviceHotSwapFailure => "device_hot_swap_failure",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Core error type for Aural
#[derive(Error, Debug)]
pub enum AuralError {
    /// Unsupported container or codec
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// File could not be opened or read
    #[error("File unreadable: {0}")]
    FileUnreadable(String),

    /// Block-level decode failure
    #[error("Decode error: {0}")]
    DecodeBlock(String),

    /// Device missing or refused to open
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Device rejected the stream format
    #[error("Device format unsupported: {0}")]
    DeviceFormatUnsupported(String),

    /// Underrun threshold exceeded
    #[error("Buffer underrun: {0}")]
    BufferUnderrun(String),

    /// Hot-swap to a new device failed
    #[error("Device hot-swap failed: {0}")]
    DeviceHotSwap(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl AuralError {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a device unavailable error
    pub fn device_unavailable(msg: impl Into<String>) -> Self {
        Self::DeviceUnavailable(msg.into())
    }

    /// Taxonomy category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::FileUnreadable(_) | Self::Io(_) => ErrorKind::FileUnreadable,
            Self::DecodeBlock(_) => ErrorKind::DecodeBlockError,
            Self::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            Self::DeviceFormatUnsupported(_) => ErrorKind::DeviceFormatUnsupported,
            Self::BufferUnderrun(_) => ErrorKind::BufferUnderrun,
            Self::DeviceHotSwap(_) => ErrorKind::DeviceHotSwapFailure,
            Self::InvalidInput(_) | Self::Serialization(_) => ErrorKind::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_unreadable_files() {
        let err = AuralError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), ErrorKind::FileUnreadable);
    }

    #[test]
    fn recoverable_kinds() {
        assert!(ErrorKind::DecodeBlockError.is_recoverable());
        assert!(ErrorKind::BufferUnderrun.is_recoverable());
        assert!(!ErrorKind::DeviceUnavailable.is_recoverable());
        assert!(!ErrorKind::DeviceHotSwapFailure.is_recoverable());
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::DeviceHotSwapFailure).unwrap();
        assert_eq!(json, "\"device_hot_swap_failure\"");
        assert_eq!(ErrorKind::DeviceHotSwapFailure.to_string(), "device_hot_swap_failure");
    }
}
