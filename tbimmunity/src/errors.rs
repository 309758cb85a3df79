use std::path::PathBuf;

use libcallpatch::{
    ForwardError, MemoryError, PatchError, common::VersionError, ffi::FnPtrError,
};
use thiserror::Error;

use crate::gamedata::GameDataError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown log level \"{0}\"")]
    BadLogLevel(String),

    #[error("Invalid binary version: {0}")]
    BadVersion(#[from] VersionError),
}

/// Why a gamedata entry could not be turned into an address
#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    GameData(#[from] GameDataError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Library \"{0}\" is not registered")]
    LibraryNotLoaded(String),

    #[error("Signature not found in \"{0}\"")]
    NoMatch(String),

    #[error("Symbol \"{0}\" not found")]
    SymbolNotFound(String),

    #[error("Symbol lookup is not supported on this platform (\"{0}\")")]
    SymbolsUnsupported(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Couldn't find \"{name}\" function.")]
    FunctionNotFound {
        name: String,
        #[source]
        cause: LookupError,
    },

    #[error("Couldn't read \"{name}\" offset from gamedata.")]
    OffsetNotFound {
        name: String,
        #[source]
        cause: LookupError,
    },
}

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Forward error: {0}")]
    Forward(#[from] ForwardError),

    #[error("FnPtr error: {0}")]
    FnPtr(#[from] FnPtrError),

    #[error("Another instance already intercepts the player lookup")]
    AlreadyLoaded,

    #[error("Call target moved from 0x{expected:X} to 0x{actual:X} while patching")]
    TargetChanged { expected: usize, actual: usize },

    #[error("SDKTools interface is not available")]
    ProviderMissing,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NativeError {
    #[error("Failed to lookup ISDKTools interface.")]
    ProviderMissing,

    #[error("SDKTools is outdated. BalanceTeams is disabled.")]
    ProviderOutdated,

    #[error("Failed to get a CGameRules pointer from SDKTools.")]
    NoGameRules,

    #[error("Native \"{0}\" is not registered")]
    UnknownNative(String),
}

pub type ExtensionResult<T> = std::result::Result<T, ExtensionError>;
pub type NativeResult<T> = std::result::Result<T, NativeError>;
