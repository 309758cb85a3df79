use std::{collections::BTreeMap, path::Path, str::FromStr};

use libcallpatch::common::{ModuleVersion, Pattern};

use super::model::{GameDataDocument, GameSection};
use super::{DEFAULT_SECTION, GameDataError, OffsetEntry, Platform, SignatureEntry};

/// Parsed gamedata document with its sections checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    default: GameSection,
    versions: Vec<(ModuleVersion, GameSection)>,
}

impl GameConfig {
    pub fn parse(text: &str) -> Result<Self, GameDataError> {
        let document: GameDataDocument = toml::from_str(text)?;

        let mut default = GameSection::default();
        let mut versions = Vec::new();

        for (key, section) in document.games {
            if key == DEFAULT_SECTION {
                default = section;
                continue;
            }

            let version = ModuleVersion::from_str(&key)
                .map_err(|source| GameDataError::BadVersionKey { key, source })?;
            versions.push((version, section));
        }

        Ok(Self { default, versions })
    }

    pub fn load(path: &Path) -> Result<Self, GameDataError> {
        let text = std::fs::read_to_string(path).map_err(|source| GameDataError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse(&text)?;
        log::debug!(
            "Gamedata {} loaded ({} version sections)",
            path.display(),
            config.versions.len()
        );

        Ok(config)
    }

    /// `#default` entries overlaid with the section for `version`, if any.
    pub fn select(&self, version: Option<&ModuleVersion>) -> GameEntries {
        self.select_for(version, Platform::current())
    }

    pub fn select_for(&self, version: Option<&ModuleVersion>, platform: Platform) -> GameEntries {
        let mut signatures = self.default.signatures.clone();
        let mut offsets = self.default.offsets.clone();

        let matching = version.and_then(|version| {
            self.versions
                .iter()
                .find(|(section_version, _)| section_version == version)
        });

        if let Some((section_version, section)) = matching {
            log::debug!("Using gamedata section for version {}", section_version);
            signatures.extend(section.signatures.clone());
            offsets.extend(section.offsets.clone());
        } else if let Some(version) = version {
            log::debug!("No gamedata section for version {}, using defaults", version);
        }

        GameEntries {
            platform,
            signatures,
            offsets,
        }
    }
}

/// Entries for one binary version on one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEntries {
    platform: Platform,
    signatures: BTreeMap<String, SignatureEntry>,
    offsets: BTreeMap<String, OffsetEntry>,
}

impl GameEntries {
    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn signature_entry(&self, name: &str) -> Result<&SignatureEntry, GameDataError> {
        self.signatures
            .get(name)
            .ok_or_else(|| GameDataError::MissingSignature(name.to_string()))
    }

    /// Signature text for this platform. `@` prefixed values name a symbol.
    pub fn signature(&self, name: &str) -> Result<&str, GameDataError> {
        self.signature_entry(name)?
            .for_platform(self.platform)
            .ok_or_else(|| GameDataError::NoPlatformValue {
                name: name.to_string(),
                platform: self.platform,
            })
    }

    pub fn pattern(&self, name: &str) -> Result<Pattern, GameDataError> {
        Pattern::parse(self.signature(name)?).map_err(|source| GameDataError::BadSignature {
            name: name.to_string(),
            source,
        })
    }

    pub fn offset(&self, name: &str) -> Result<usize, GameDataError> {
        self.offsets
            .get(name)
            .ok_or_else(|| GameDataError::MissingOffset(name.to_string()))?
            .for_platform(self.platform)
            .ok_or_else(|| GameDataError::NoPlatformValue {
                name: name.to_string(),
                platform: self.platform,
            })
    }
}
