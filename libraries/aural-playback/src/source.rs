//! Block source abstraction
//!
//! The engine pulls decoded blocks through [`BlockSource`] so tests can script
//! sources (stalls, failures, exact lengths) without real files. The desktop
//! build uses [`aural_audio::Decoder`] through [`DecoderOpener`].

use crate::error::Result;
use aural_audio::{Decoder, StreamProperties};
use aural_core::AudioBlock;
use std::path::Path;
use std::time::Duration;

/// Sequential, seekable stream of decoded blocks
pub trait BlockSource: Send {
    /// Sample rate, channel count and duration of the stream
    fn properties(&self) -> StreamProperties;

    /// Next block, `Ok(None)` at end of stream
    ///
    /// An error means one block was lost; the stream stays usable.
    fn read_block(&mut self) -> Result<Option<AudioBlock>>;

    /// Reposition; returns where the stream actually landed
    fn seek(&mut self, position: Duration) -> Result<Duration>;
}

impl BlockSource for Decoder {
    fn properties(&self) -> StreamProperties {
        Decoder::properties(self)
    }

    fn read_block(&mut self) -> Result<Option<AudioBlock>> {
        Ok(Decoder::read_block(self)?)
    }

    fn seek(&mut self, position: Duration) -> Result<Duration> {
        Ok(Decoder::seek(self, position)?)
    }
}

/// Opens a [`BlockSource`] for a path
pub trait SourceOpener: Send {
    /// Open `path`, producing blocks of `block_frames` frames
    fn open(&mut self, path: &Path, block_frames: usize) -> Result<Box<dyn BlockSource>>;
}

/// Opens files with the symphonia-backed [`Decoder`]
#[derive(Debug, Default, Clone, Copy)]
pub struct DecoderOpener;

impl SourceOpener for DecoderOpener {
    fn open(&mut self, path: &Path, block_frames: usize) -> Result<Box<dyn BlockSource>> {
        Ok(Box::new(Decoder::open(path, block_frames)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlaybackError;
    use aural_core::ErrorKind;

    #[test]
    fn missing_file_is_unreadable() {
        let err = DecoderOpener
            .open(Path::new("/nonexistent/track.flac"), 1024)
            .err()
            .unwrap();
        assert!(matches!(err, PlaybackError::Audio(_)));
        assert_eq!(err.kind(), ErrorKind::FileUnreadable);
    }
}
