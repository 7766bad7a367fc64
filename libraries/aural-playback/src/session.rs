//! Playback session
//!
//! Everything tied to one loaded track. Created on load, dropped on stop or
//! when the next track replaces it.

use crate::source::BlockSource;
use aural_audio::StreamProperties;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// State of the currently loaded track
pub(crate) struct PlaybackSession {
    path: PathBuf,
    source: Box<dyn BlockSource>,
    properties: StreamProperties,
    /// Block decode failures since the last good block
    consecutive_failures: u32,
    /// Source reported end of stream
    decoding_finished: bool,
    /// Processed block waiting for buffer space when a pause or seek came in
    held: Option<aural_core::AudioBlock>,
}

impl PlaybackSession {
    pub(crate) fn new(path: PathBuf, source: Box<dyn BlockSource>) -> Self {
        let properties = source.properties();
        Self {
            path,
            source,
            properties,
            consecutive_failures: 0,
            decoding_finished: false,
            held: None,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn properties(&self) -> StreamProperties {
        self.properties
    }

    pub(crate) fn source_mut(&mut self) -> &mut dyn BlockSource {
        self.source.as_mut()
    }

    /// Count one failed block, returning the running total
    pub(crate) fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    pub(crate) fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub(crate) fn is_decoding_finished(&self) -> bool {
        self.decoding_finished
    }

    pub(crate) fn set_decoding_finished(&mut self, finished: bool) {
        self.decoding_finished = finished;
    }

    pub(crate) fn hold(&mut self, block: aural_core::AudioBlock) {
        self.held = Some(block);
    }

    pub(crate) fn has_held(&self) -> bool {
        self.held.is_some()
    }

    pub(crate) fn take_held(&mut self) -> Option<aural_core::AudioBlock> {
        self.held.take()
    }

    /// Forget position-dependent state after a seek
    pub(crate) fn repositioned(&mut self) {
        self.held = None;
        self.decoding_finished = false;
        self.consecutive_failures = 0;
    }

    /// Duration in whole milliseconds, when known
    pub(crate) fn duration_ms(&self) -> Option<u64> {
        self.properties.duration.map(duration_ms)
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Serializable view of the session for an external store
///
/// Loading `path` with `start_at = position_ms` and reapplying the preset
/// restores the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Track path
    pub path: PathBuf,
    /// Position in milliseconds
    pub position_ms: u64,
    /// Active preset name ("Custom" after band edits)
    pub preset: String,
    /// Requested band gains (dB)
    pub gains: [f32; aural_core::BAND_COUNT],
    /// Volume level (0-100)
    pub volume: u8,
}

impl SessionSnapshot {
    /// Position as a duration
    pub fn position(&self) -> Duration {
        Duration::from_millis(self.position_ms)
    }
}
