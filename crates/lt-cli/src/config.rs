//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use lt_core::session::CharacterKey;

/// The character whose sessions this installation tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterConfig {
    pub name: String,
    pub realm: String,
    pub faction: String,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            name: "Unknown".to_string(),
            realm: "Unknown".to_string(),
            faction: "Neutral".to_string(),
        }
    }
}

impl CharacterConfig {
    #[must_use]
    pub fn key(&self) -> CharacterKey {
        CharacterKey::new(&*self.name, &*self.realm, &*self.faction)
    }
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    #[serde(default)]
    pub character: CharacterConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("character", &self.character)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("lt.db"),
            character: CharacterConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (LT_*)
        figment = figment.merge(Env::prefixed("LT_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for lt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("lt"))
}

/// Returns the platform-specific data directory for lt.
///
/// On Linux: `~/.local/share/lt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("lt"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirs_data_path_ends_with_lt() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "lt");
    }

    #[test]
    fn default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("lt.db"));
    }

    #[test]
    fn default_character_is_the_unknown_neutral() {
        let key = Config::default().character.key();
        assert_eq!(key.to_string(), "Unknown-Unknown-Neutral");
    }
}
