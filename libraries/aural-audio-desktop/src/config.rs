//! Output configuration

use aural_audio::ResamplingQuality;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Device output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// How often the default device is checked (milliseconds, default: 250)
    pub poll_interval_ms: u64,

    /// Longest acceptable silence during a hot-swap (milliseconds, default: 50)
    ///
    /// Exceeding it is logged; the swap still completes.
    pub max_swap_gap_ms: u64,

    /// Converter used when the device rate differs from the stream rate
    pub resampling: ResamplingQuality,

    /// Device to open by name instead of following the system default
    pub device: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            max_swap_gap_ms: 50,
            resampling: ResamplingQuality::Fast,
            device: None,
        }
    }
}

impl OutputConfig {
    /// Default-device poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Hot-swap gap budget
    pub fn max_swap_gap(&self) -> Duration {
        Duration::from_millis(self.max_swap_gap_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = OutputConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.max_swap_gap(), Duration::from_millis(50));
        assert_eq!(config.resampling, ResamplingQuality::Fast);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: OutputConfig =
            serde_json::from_str(r#"{"device": "USB DAC", "resampling": "high"}"#).unwrap();
        assert_eq!(config.device.as_deref(), Some("USB DAC"));
        assert_eq!(config.resampling, ResamplingQuality::High);
        assert_eq!(config.poll_interval_ms, 250);
    }
}
