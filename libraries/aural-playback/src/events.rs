//! Playback Events
//!
//! Event-based communication for UI and playlist collaborators.
//! Events are emitted at key points:
//! - State changes (load/play/pause/seek/stop/fail)
//! - Track boundaries (loaded, finished, failed)
//! - Position updates (periodic)
//! - Recoverable faults that crossed their warning threshold
//! - Device, volume and preset changes

use crate::types::PlaybackState;
use aural_core::{DeviceDescriptor, ErrorKind};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Events a subscriber may fall behind by before new ones are dropped for it
pub const EVENT_CAPACITY: usize = 256;

/// Events emitted by the playback engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackEvent {
    /// Transport state changed
    StateChanged {
        /// The new state
        state: PlaybackState,
    },

    /// A track was opened and is about to play
    TrackLoaded {
        /// File path
        path: PathBuf,
        /// Source sample rate (Hz)
        sample_rate: u32,
        /// Source channel count
        channels: u16,
        /// Duration in milliseconds, when known
        duration_ms: Option<u64>,
    },

    /// Track played to the end; the playlist may supply the next one
    TrackFinished {
        /// File path
        path: PathBuf,
    },

    /// Track could not be opened or played
    TrackFailed {
        /// File path, when a track was involved
        path: Option<PathBuf>,
        /// Taxonomy category
        kind: ErrorKind,
        /// Human-readable reason
        message: String,
    },

    /// Position update (periodic while playing, and after seeks)
    PositionChanged {
        /// Current playback position
        position_ms: u64,
        /// Total track duration, when known
        duration_ms: Option<u64>,
    },

    /// Recoverable problem surfaced for diagnostics
    Warning {
        /// Taxonomy category
        kind: ErrorKind,
        /// Human-readable detail
        message: String,
    },

    /// Output moved to another device
    DeviceChanged {
        /// Device now playing
        device: DeviceDescriptor,
        /// Silent gap during the switch (milliseconds)
        gap_ms: u64,
    },

    /// Volume changed
    VolumeChanged {
        /// New volume level (0-100)
        level: u8,
        /// Whether audio is muted
        is_muted: bool,
    },

    /// Equalizer preset or band gains changed
    PresetChanged {
        /// Preset name ("Custom" after a single band edit)
        name: String,
        /// Requested gains (dB)
        gains: [f32; aural_core::BAND_COUNT],
    },
}

impl PlaybackEvent {
    /// Whether this event reports a problem
    pub fn is_error(&self) -> bool {
        matches!(self, Self::TrackFailed { .. } | Self::Warning { .. })
    }
}

/// Fan-out of engine events to every subscriber
///
/// Each subscriber has its own bounded queue and sees only events emitted
/// after it subscribed. A subscriber that stops reading loses new events
/// once its queue is full; one whose receiver is dropped is forgotten.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<PlaybackEvent>>>>,
}

impl EventBus {
    /// Create a bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<PlaybackEvent> {
        let (tx, rx) = bounded(EVENT_CAPACITY);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber
    pub fn emit(&self, event: PlaybackEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                debug!(?dropped, "Event subscriber is full, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped() -> PlaybackEvent {
        PlaybackEvent::StateChanged {
            state: PlaybackState::Stopped,
        }
    }

    #[test]
    fn every_subscriber_sees_every_event() {
        let bus = EventBus::new();
        let ui = bus.subscribe();
        let playlist = bus.subscribe();

        bus.emit(PlaybackEvent::TrackFinished {
            path: PathBuf::from("/music/one.flac"),
        });

        for rx in [&ui, &playlist] {
            assert!(matches!(
                rx.try_recv(),
                Ok(PlaybackEvent::TrackFinished { .. })
            ));
        }
    }

    #[test]
    fn late_subscriber_gets_no_backlog() {
        let bus = EventBus::new();
        bus.emit(stopped());
        let rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn idle_subscriber_stays_bounded() {
        let bus = EventBus::new();
        let idle = bus.subscribe();
        for _ in 0..EVENT_CAPACITY * 3 {
            bus.emit(stopped());
        }
        assert_eq!(idle.len(), EVENT_CAPACITY);
    }

    #[test]
    fn dropped_subscriber_is_forgotten() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        bus.emit(stopped());
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn serializes_with_tagged_variants() {
        let event = PlaybackEvent::Warning {
            kind: ErrorKind::BufferUnderrun,
            message: "32 underruns".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"Warning\""));
        assert!(json.contains("\"buffer_underrun\""));

        let back: PlaybackEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert!(back.is_error());
    }

    #[test]
    fn state_change_is_not_an_error() {
        let event = PlaybackEvent::StateChanged {
            state: PlaybackState::Playing,
        };
        assert!(!event.is_error());
    }
}
