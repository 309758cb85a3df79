//! Dotted binary versions such as `1.0.0.34`

use std::{fmt, str::FromStr};

use thiserror::Error;

pub const MAX_COMPONENTS: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Version string is empty")]
    Empty,

    #[error("Version \"{0}\" has more than 4 components")]
    TooManyComponents(String),

    #[error("Invalid version component \"{component}\" in \"{version}\"")]
    InvalidComponent { version: String, component: String },
}

/// Version of a loaded module, compared component by component.
///
/// Missing trailing components count as zero, so `1.2` equals `1.2.0.0`
/// and displays the way it was written.
#[derive(Debug, Clone, Copy)]
pub struct ModuleVersion {
    components: [u32; MAX_COMPONENTS],
    count: usize,
}

impl ModuleVersion {
    pub fn new(major: u32, minor: u32, build: u32, sub: u32) -> Self {
        Self {
            components: [major, minor, build, sub],
            count: MAX_COMPONENTS,
        }
    }

    pub fn major(&self) -> u32 {
        self.components[0]
    }

    pub fn minor(&self) -> u32 {
        self.components[1]
    }

    pub fn build(&self) -> u32 {
        self.components[2]
    }

    pub fn sub(&self) -> u32 {
        self.components[3]
    }

    pub fn components(&self) -> &[u32] {
        &self.components[..self.count]
    }
}

impl FromStr for ModuleVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut components = [0u32; MAX_COMPONENTS];
        let mut count = 0;

        for part in s.split('.') {
            if count == MAX_COMPONENTS {
                return Err(VersionError::TooManyComponents(s.to_string()));
            }

            components[count] = part.parse().map_err(|_| VersionError::InvalidComponent {
                version: s.to_string(),
                component: part.to_string(),
            })?;
            count += 1;
        }

        Ok(Self { components, count })
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, component) in self.components().iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", component)?;
        }
        Ok(())
    }
}

impl PartialEq for ModuleVersion {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for ModuleVersion {}

impl std::hash::Hash for ModuleVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl PartialOrd for ModuleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModuleVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.components.cmp(&other.components)
    }
}
