pub const EXTENSION_NAME: &str = "Team Balance Immunity";
pub const EXTENSION_DESCRIPTION: &str = "Lets plugins exempt players from the automatic team balancer";
pub const EXTENSION_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const EXTENSION_AUTHOR: &str = "DonRevan";
pub const EXTENSION_LOG_TAG: &str = "TBIMMUNITY";

/// Gamedata file name, without the `.games.toml` suffix
pub const GAMEDATA_NAME: &str = "tbimmunity";
