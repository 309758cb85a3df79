//! Team Balance Immunity
//!
//! Counter-Strike: Source balances teams by walking every player slot
//! through `UTIL_PlayerByIndex` inside `CCSGameRules::BalanceTeams`. This
//! extension redirects that one call so plugins subscribed to the
//! `OnBalanceCheck` forward can hide a player from the balancer. The rest
//! of the routine runs untouched.
//!
//! Also exposes the `CSS_BalanceTeams` native, which runs the balancer on
//! demand through SDKTools' game rules pointer.

pub mod config;
pub mod errors;
pub mod extension;
pub mod gamedata;
pub mod interceptor;
pub mod logging;
pub mod natives;
pub mod plugininfo;
pub mod provider;
pub mod resolver;

use std::{path::Path, sync::Arc};

use anyhow::Context;
use libcallpatch::{ForwardManager, ProcessMemory};

pub use config::ExtensionConfig;
pub use errors::{ExtensionError, NativeError, ResolveError};
pub use extension::Extension;
pub use gamedata::GameConfig;
pub use provider::GameRulesProvider;
pub use resolver::{AddressResolver, GameDataResolver, ModuleImage};

/// Loads config and gamedata, sets up logging and patches the balancer.
///
/// `modules` are the libraries signatures may be scanned in, `server`
/// among them.
pub fn start(
    config_path: &Path,
    modules: Vec<ModuleImage>,
    forwards: Arc<ForwardManager<i32>>,
) -> anyhow::Result<Extension> {
    let config = ExtensionConfig::load_or_default(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    logging::init(&config).context("Failed to initialize logging")?;

    let game_config = GameConfig::load(&config.gamedata_path).with_context(|| {
        format!(
            "Failed to load game config \"{}\"",
            plugininfo::GAMEDATA_NAME
        )
    })?;

    let version = config.binary_version()?;
    let mut resolver = GameDataResolver::new(game_config.select(version.as_ref()), ProcessMemory::new());
    for module in modules {
        resolver.register_module(module);
    }

    let extension = Extension::load(ProcessMemory::new(), &resolver, forwards)
        .context("Failed to load extension")?;

    log::info!(
        "{} {} loaded",
        plugininfo::EXTENSION_NAME,
        plugininfo::EXTENSION_VERSION
    );

    Ok(extension)
}
