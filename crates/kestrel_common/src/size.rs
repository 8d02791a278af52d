//! Byte sizes with unit parsing and display.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// A size in bytes.
///
/// Supports parsing from strings like "50MB", "512KB", "1GB", "100B", and
/// bare numeric values (interpreted as bytes). Units are binary multiples.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(u64);

impl ByteSize {
    /// Creates a size from a byte count.
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Creates a size from a megabyte count.
    pub const fn mb(mb: u64) -> Self {
        Self(mb * MB)
    }

    /// Returns the size in bytes.
    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteSize({self})")
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        if b >= GB && b % GB == 0 {
            write!(f, "{}GB", b / GB)
        } else if b >= MB && b % MB == 0 {
            write!(f, "{}MB", b / MB)
        } else if b >= KB && b % KB == 0 {
            write!(f, "{}KB", b / KB)
        } else {
            write!(f, "{b}B")
        }
    }
}

/// Error type for parsing byte-size strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid byte size: '{input}'")]
pub struct ParseByteSizeError {
    /// The input string that failed to parse.
    pub input: String,
}

impl FromStr for ByteSize {
    type Err = ParseByteSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseByteSizeError {
            input: s.to_string(),
        };

        let lower = s.to_ascii_lowercase();
        let (num, scale) = if let Some(num) = lower.strip_suffix("gb") {
            (num, GB)
        } else if let Some(num) = lower.strip_suffix("mb") {
            (num, MB)
        } else if let Some(num) = lower.strip_suffix("kb") {
            (num, KB)
        } else if let Some(num) = lower.strip_suffix('b') {
            (num, 1)
        } else {
            (lower.as_str(), 1)
        };

        let value: u64 = num.trim().parse().map_err(|_| err())?;
        value.checked_mul(scale).map(ByteSize).ok_or_else(err)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
