pub mod sigscan;
pub mod version;

pub use sigscan::{Pattern, PatternError};
pub use version::{ModuleVersion, VersionError};
