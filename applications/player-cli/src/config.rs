/// Player configuration
use crate::error::{PlayerError, Result};
use aural_audio_desktop::OutputConfig;
use aural_core::EqualizerPreset;
use aural_playback::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "aural.toml";

/// Prefix of environment overrides, e.g. `AURAL_ENGINE__VOLUME=70`
pub const ENV_PREFIX: &str = "AURAL";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Decode pipeline and transport settings
    pub engine: EngineConfig,

    /// Device output settings
    pub output: OutputConfig,

    /// User presets, looked up before the built-in ones
    pub presets: Vec<PresetEntry>,
}

/// A named gain vector as written in the config file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PresetEntry {
    pub name: String,
    pub gains: Vec<f32>,
}

impl PlayerConfig {
    /// Load configuration from file and environment
    ///
    /// An explicit `path` must exist; otherwise `aural.toml` is read when
    /// present. Environment variables override both.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(PlayerError::Config(format!(
                        "config file {} not found",
                        path.display()
                    )));
                }
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        // Nested keys use a double underscore: AURAL_OUTPUT__POLL_INTERVAL_MS
        settings = settings.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings
            .build()
            .map_err(|e| PlayerError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| PlayerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.engine
            .validate()
            .map_err(|e| PlayerError::Config(e.to_string()))?;
        self.engine
            .spectrum
            .validate()
            .map_err(|e| PlayerError::Config(e.to_string()))?;
        self.user_presets()?;
        Ok(())
    }

    /// User presets, each checked for ten in-range gains
    pub fn user_presets(&self) -> Result<Vec<EqualizerPreset>> {
        self.presets
            .iter()
            .map(|entry| {
                EqualizerPreset::new(entry.name.clone(), &entry.gains).map_err(|e| {
                    PlayerError::Config(format!("preset '{}': {}", entry.name, e))
                })
            })
            .collect()
    }

    /// Find a preset by name, user presets first
    pub fn preset(&self, name: &str) -> Result<EqualizerPreset> {
        let user = self
            .user_presets()?
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name));
        user.or_else(|| EqualizerPreset::builtin(name))
            .ok_or_else(|| PlayerError::UnknownPreset(name.to_string()))
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PlayerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn file_values_override_defaults() {
        let file = write_config(
            r#"
            [engine]
            volume = 70
            buffer_capacity = 4

            [output]
            device = "USB DAC"

            [[presets]]
            name = "Late Night"
            gains = [-3, -2, 0, 0, 0, 0, 0, 0, -2, -4]
            "#,
        );

        let config = PlayerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.engine.volume, 70);
        assert_eq!(config.engine.buffer_capacity, 4);
        assert_eq!(config.engine.block_frames, 1024);
        assert_eq!(config.output.device.as_deref(), Some("USB DAC"));
        assert_eq!(config.output.max_swap_gap_ms, 50);

        let preset = config.preset("late night").unwrap();
        assert_eq!(preset.gains()[0], -3.0);
    }

    #[test]
    fn builtin_presets_are_found() {
        let config = PlayerConfig::default();
        assert_eq!(config.preset("Rock").unwrap().gains()[1], 6.0);
        assert!(matches!(
            config.preset("polka"),
            Err(PlayerError::UnknownPreset(_))
        ));
    }

    #[test]
    fn malformed_preset_is_rejected() {
        let file = write_config(
            r#"
            [[presets]]
            name = "Broken"
            gains = [0, 0, 0]
            "#,
        );
        let err = PlayerConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Broken"), "{err}");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = PlayerConfig::load(Some(Path::new("/nonexistent/aural.toml"))).unwrap_err();
        assert!(matches!(err, PlayerError::Config(_)));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = PlayerConfig::default();
        config.engine.buffer_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_output_reloads() {
        let config = PlayerConfig::default();
        let text = config.to_toml().unwrap();
        let file = write_config(&text);
        let reloaded = PlayerConfig::load(Some(file.path())).unwrap();
        assert_eq!(reloaded.engine, config.engine);
        assert_eq!(reloaded.output, config.output);
    }
}
