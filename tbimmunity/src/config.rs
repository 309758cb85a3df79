use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use libcallpatch::common::ModuleVersion;
use serde::Deserialize;

use crate::{errors::ConfigError, plugininfo};

/// Extension settings, read from a TOML file next to the extension.
///
/// Every key is optional:
///
/// ```toml
/// log_level = "debug"
/// log_file = "logs/tbimmunity.log"
/// gamedata_path = "gamedata/tbimmunity.games.toml"
/// binary_version = "1.0.0.34"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtensionConfig {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub gamedata_path: PathBuf,
    pub binary_version: Option<String>,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            gamedata_path: PathBuf::from(format!("gamedata/{}.games.toml", plugininfo::GAMEDATA_NAME)),
            binary_version: None,
        }
    }
}

impl ExtensionConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;

        // Surface bad values at load time rather than at first use
        config.level_filter()?;
        config.binary_version()?;

        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&text)
    }

    /// Defaults when the file does not exist; any other failure is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load(path)
    }

    pub fn level_filter(&self) -> Result<log::LevelFilter, ConfigError> {
        log::LevelFilter::from_str(&self.log_level)
            .map_err(|_| ConfigError::BadLogLevel(self.log_level.clone()))
    }

    pub fn binary_version(&self) -> Result<Option<ModuleVersion>, ConfigError> {
        Ok(self
            .binary_version
            .as_deref()
            .map(ModuleVersion::from_str)
            .transpose()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = ExtensionConfig::parse("").unwrap();
        assert_eq!(config, ExtensionConfig::default());
        assert_eq!(config.level_filter().unwrap(), log::LevelFilter::Info);
        assert_eq!(config.binary_version().unwrap(), None);
    }

    #[test]
    fn test_full_document() {
        let config = ExtensionConfig::parse(
            r#"
            log_level = "debug"
            log_file = "logs/tbimmunity.log"
            gamedata_path = "/srv/css/gamedata/tbimmunity.games.toml"
            binary_version = "1.0.0.34"
            "#,
        )
        .unwrap();

        assert_eq!(config.level_filter().unwrap(), log::LevelFilter::Debug);
        assert_eq!(config.log_file, Some(PathBuf::from("logs/tbimmunity.log")));
        assert_eq!(
            config.binary_version().unwrap(),
            Some(ModuleVersion::new(1, 0, 0, 34))
        );
    }

    #[test]
    fn test_bad_values() {
        assert!(matches!(
            ExtensionConfig::parse("log_level = \"loud\""),
            Err(ConfigError::BadLogLevel(level)) if level == "loud"
        ));
        assert!(matches!(
            ExtensionConfig::parse("binary_version = \"1.x\""),
            Err(ConfigError::BadVersion(_))
        ));
        assert!(matches!(
            ExtensionConfig::parse("log_colour = true"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("tbimmunity-config-that-does-not-exist.toml");
        assert_eq!(
            ExtensionConfig::load_or_default(&path).unwrap(),
            ExtensionConfig::default()
        );
    }
}
