//! Byte signature scanning
//!
//! Signatures are space separated hex bytes; `?` or `??` matches any byte.
//! Hex does not need a `0x` prefix.

use std::{fmt, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("Pattern is empty")]
    Empty,

    #[error("Invalid byte \"{token}\" at position {position} in pattern")]
    InvalidByte { token: String, position: usize },

    #[error("Pattern has only wildcards")]
    OnlyWildcards,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    bytes: Vec<Option<u8>>,
}

impl Pattern {
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let mut bytes = Vec::new();

        for (position, token) in text.split_whitespace().enumerate() {
            if token == "?" || token == "??" {
                bytes.push(None);
                continue;
            }

            let digits = token.strip_prefix("0x").unwrap_or(token);

            // from_str_radix alone would take a leading sign
            if digits.is_empty() || digits.len() > 2 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(PatternError::InvalidByte {
                    token: token.to_string(),
                    position,
                });
            }

            let byte = u8::from_str_radix(digits, 16).map_err(|_| PatternError::InvalidByte {
                token: token.to_string(),
                position,
            })?;
            bytes.push(Some(byte));
        }

        if bytes.is_empty() {
            return Err(PatternError::Empty);
        }

        if bytes.iter().all(Option::is_none) {
            return Err(PatternError::OnlyWildcards);
        }

        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[Option<u8>] {
        &self.bytes
    }

    /// Offset of the first match in `haystack`.
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        if haystack.len() < self.bytes.len() {
            return None;
        }

        haystack.windows(self.bytes.len()).position(|window| {
            window
                .iter()
                .zip(&self.bytes)
                .all(|(byte, expected)| expected.is_none_or(|expected| expected == *byte))
        })
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.bytes.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            match byte {
                Some(byte) => write!(f, "{:02X}", byte)?,
                None => f.write_str("?")?,
            }
        }
        Ok(())
    }
}
