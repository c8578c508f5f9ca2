//! Player configuration, loaded from TOML.
//!
//! Every field has a built-in default, so an empty file (or no file at all)
//! is a valid configuration.
//!
//! ```toml
//! [debounce]
//! play_pause_ms = 150
//! next_ms = 300
//! previous_ms = 300
//!
//! [playback]
//! loop_enabled = true
//! shuffle_enabled = false
//!
//! [library]
//! extensions = ["mp3", "flac"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::commands::CommandKey;
use crate::error::ConfigError;
use crate::library::{ DEFAULT_EXTENSIONS, FsExistence };

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub debounce: DebounceConfig,
    pub playback: PlaybackConfig,
    pub library: LibraryConfig,
}

/// Minimum interval between two executions of each debounced command
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    pub play_pause_ms: u64,
    pub next_ms: u64,
    pub previous_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            play_pause_ms: 150,
            next_ms: 300,
            previous_ms: 300,
        }
    }
}

impl DebounceConfig {
    pub fn interval(&self, key: CommandKey) -> Duration {
        let ms = match key {
            CommandKey::PlayPause => self.play_pause_ms,
            CommandKey::Next => self.next_ms,
            CommandKey::Previous => self.previous_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Initial playback mode flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub loop_enabled: bool,
    pub shuffle_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Playable file extensions, without the dot
    pub extensions: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PlayerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PlayerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.library.extensions.iter().all(|ext| ext.trim().is_empty()) {
            return Err(ConfigError::Invalid("library.extensions must name at least one extension".to_string()));
        }
        Ok(())
    }

    pub fn existence_check(&self) -> FsExistence {
        FsExistence::new(self.library.extensions.iter().filter(|ext| !ext.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_gives_defaults() {
        let config = PlayerConfig::from_toml_str("").unwrap();
        assert_eq!(config, PlayerConfig::default());
        assert_eq!(config.debounce.interval(CommandKey::PlayPause), Duration::from_millis(150));
        assert_eq!(config.debounce.interval(CommandKey::Next), Duration::from_millis(300));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PlayerConfig::from_toml_str(
            r#"
            [debounce]
            next_ms = 500

            [playback]
            loop_enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.debounce.next_ms, 500);
        assert_eq!(config.debounce.previous_ms, 300);
        assert!(config.playback.loop_enabled);
        assert!(!config.playback.shuffle_enabled);
        assert_eq!(config.library, LibraryConfig::default());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            PlayerConfig::from_toml_str("[debounce]\nnext_ms = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            PlayerConfig::from_toml_str("[library]\nextensions = []"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PlayerConfig::load(Path::new("/no/such/turntable.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn existence_check_uses_configured_extensions() {
        let config = PlayerConfig::from_toml_str("[library]\nextensions = [\"opus\", \"\"]").unwrap();
        let check = config.existence_check();
        assert!(check.is_playable(Path::new("a.OPUS")));
        assert!(!check.is_playable(Path::new("a.mp3")));
    }
}
