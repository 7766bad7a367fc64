//! Core types for the playback engine

use aural_audio::SpectrumConfig;
use aural_core::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No track loaded
    Stopped,

    /// Opening a track
    Loading,

    /// Currently playing
    Playing,

    /// Paused mid-track, buffered audio kept
    Paused,

    /// Flushing and repositioning the decoder
    Seeking,

    /// Stopped on an unrecoverable error; see [`FailureReason`]
    Failed,
}

impl PlaybackState {
    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// Stop is accepted from anywhere, and a new track may be loaded over a
    /// playing or paused one.
    pub fn can_transition_to(self, next: PlaybackState) -> bool {
        use PlaybackState::{Failed, Loading, Paused, Playing, Seeking, Stopped};

        match (self, next) {
            (_, Failed | Stopped) => true,
            (Stopped | Failed | Playing | Paused, Loading) => true,
            (Loading | Paused | Seeking, Playing) => true,
            (Playing, Paused) => true,
            (Playing | Paused, Seeking) => true,
            _ => false,
        }
    }

    /// Whether a track is loaded and can be positioned
    pub fn has_track(self) -> bool {
        matches!(self, Self::Playing | Self::Paused | Self::Seeking)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Seeking => "seeking",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why the engine entered `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Taxonomy category
    pub kind: ErrorKind,
    /// Human-readable explanation
    pub message: String,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// What `push` does when the playback buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushPolicy {
    /// Wait for space (backpressure on the decoder)
    #[default]
    Block,
    /// Return an error immediately
    FailFast,
}

/// Configuration for the playback engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames per decoded block (default: 1024)
    pub block_frames: usize,

    /// Playback buffer capacity in blocks (default: 8)
    pub buffer_capacity: usize,

    /// Full-buffer behavior (default: Block)
    pub push_policy: PushPolicy,

    /// Consecutive block decode failures that fail the track (default: 3)
    pub max_consecutive_decode_failures: u32,

    /// Underruns between two warnings (default: 32)
    pub underrun_warning_threshold: u64,

    /// Interval between position events in milliseconds (default: 250)
    pub position_interval_ms: u64,

    /// Initial volume, 0-100 (default: 50)
    pub volume: u8,

    /// Spectrum analyzer window and hop
    pub spectrum: SpectrumConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_frames: 1024,
            buffer_capacity: 8,
            push_policy: PushPolicy::Block,
            max_consecutive_decode_failures: 3,
            underrun_warning_threshold: 32,
            position_interval_ms: 250,
            volume: 50,
            spectrum: SpectrumConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Interval between position events
    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms.max(1))
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_frames == 0 {
            return Err(crate::PlaybackError::InvalidInput(
                "block_frames must be positive".to_string(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(crate::PlaybackError::InvalidInput(
                "buffer_capacity must be at least one block".to_string(),
            ));
        }
        if self.max_consecutive_decode_failures == 0 {
            return Err(crate::PlaybackError::InvalidInput(
                "max_consecutive_decode_failures must be positive".to_string(),
            ));
        }
        self.spectrum.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlaybackState::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.block_frames, 1024);
        assert_eq!(config.buffer_capacity, 8);
        assert_eq!(config.push_policy, PushPolicy::Block);
        assert_eq!(config.max_consecutive_decode_failures, 3);
        assert_eq!(config.volume, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"buffer_capacity": 4, "push_policy": "fail_fast"}"#).unwrap();
        assert_eq!(config.buffer_capacity, 4);
        assert_eq!(config.push_policy, PushPolicy::FailFast);
        assert_eq!(config.block_frames, 1024);
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = EngineConfig {
            buffer_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn documented_transitions() {
        assert!(Stopped.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Playing));
        assert!(Loading.can_transition_to(Failed));
        assert!(Playing.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Seeking));
        assert!(Paused.can_transition_to(Seeking));
        assert!(Seeking.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Stopped));
        assert!(Failed.can_transition_to(Loading));
    }

    #[test]
    fn refused_transitions() {
        assert!(!Stopped.can_transition_to(Playing));
        assert!(!Stopped.can_transition_to(Paused));
        assert!(!Stopped.can_transition_to(Seeking));
        assert!(!Failed.can_transition_to(Playing));
        assert!(!Seeking.can_transition_to(Paused));
        assert!(!Loading.can_transition_to(Seeking));
    }

    #[test]
    fn every_state_can_fail() {
        for state in [Stopped, Loading, Playing, Paused, Seeking, Failed] {
            assert!(state.can_transition_to(Failed));
        }
    }
}
