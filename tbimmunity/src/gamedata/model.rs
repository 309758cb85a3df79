use std::fmt;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    Mac,
}

impl Platform {
    pub const fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Mac
        } else {
            Self::Linux
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Mac => "mac",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn default_library() -> String {
    "server".to_string()
}

/// Byte signature (or `@symbol`) per platform, scanned in `library`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureEntry {
    #[serde(default = "default_library")]
    pub library: String,
    pub windows: Option<String>,
    pub linux: Option<String>,
    pub mac: Option<String>,
}

impl SignatureEntry {
    pub fn for_platform(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Windows => self.windows.as_deref(),
            Platform::Linux => self.linux.as_deref(),
            Platform::Mac => self.mac.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OffsetEntry {
    pub windows: Option<usize>,
    pub linux: Option<usize>,
    pub mac: Option<usize>,
}

impl OffsetEntry {
    pub fn for_platform(&self, platform: Platform) -> Option<usize> {
        match platform {
            Platform::Windows => self.windows,
            Platform::Linux => self.linux,
            Platform::Mac => self.mac,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(super) struct GameSection {
    pub(super) signatures: std::collections::BTreeMap<String, SignatureEntry>,
    pub(super) offsets: std::collections::BTreeMap<String, OffsetEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(super) struct GameDataDocument {
    pub(super) games: std::collections::BTreeMap<String, GameSection>,
}
