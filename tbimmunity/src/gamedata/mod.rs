//! Gamedata: where in the game binary the patch goes
//!
//! A gamedata document maps symbolic names to signatures and offsets per
//! platform, in sections keyed `#default` or by binary version:
//!
//! ```toml
//! [games."#default".signatures.BalanceTeams]
//! library = "server"
//! windows = "55 8B EC 83 EC ? 53"
//! linux   = "@_ZN12CCSGameRules12BalanceTeamsEv"
//!
//! [games."#default".offsets.PlayerByIndex]
//! windows = 0x17A
//! linux   = 0x104
//! ```

mod loader;
mod model;

pub use loader::{GameConfig, GameEntries};
pub use model::{OffsetEntry, Platform, SignatureEntry};

use std::path::PathBuf;

use libcallpatch::common::{PatternError, VersionError};
use thiserror::Error;

pub const DEFAULT_SECTION: &str = "#default";

#[derive(Debug, Error)]
pub enum GameDataError {
    #[error("Failed to read gamedata {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse gamedata: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Gamedata section \"{key}\" is neither \"#default\" nor a version: {source}")]
    BadVersionKey { key: String, source: VersionError },

    #[error("Signature \"{0}\" is missing from gamedata")]
    MissingSignature(String),

    #[error("Offset \"{0}\" is missing from gamedata")]
    MissingOffset(String),

    #[error("\"{name}\" has no value for {platform}")]
    NoPlatformValue { name: String, platform: Platform },

    #[error("Signature \"{name}\" is malformed: {source}")]
    BadSignature { name: String, source: PatternError },
}
