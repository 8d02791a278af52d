//! Content hashing for change detection and cache validation.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A 256-bit content hash computed using SHA-256.
///
/// Two files with the same `ContentHash` are assumed to have identical content.
/// Serialized as a lowercase 64-character hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Computes a content hash from a byte slice using SHA-256.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Error returned when a string is not a 64-character hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content hash: '{input}'")]
pub struct ParseHashError {
    /// The input string that failed to parse.
    pub input: String,
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseHashError {
            input: s.to_string(),
        };
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(err());
        }
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }
        Ok(Self(out))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The recorded hash of a file: either a known digest or the "unknown" sentinel.
///
/// The sentinel stands for a file that could not be hashed (too large,
/// unreadable, vanished mid-scan). It is persisted as the empty string.
///
/// `==` compares structurally. Change detection must use [`matches`](Self::matches),
/// under which the sentinel is never equal to anything, itself included.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileHash(Option<ContentHash>);

impl FileHash {
    /// The "unknown/unhashable" sentinel.
    pub const UNKNOWN: Self = Self(None);

    /// Wraps a known content hash.
    pub fn known(hash: ContentHash) -> Self {
        Self(Some(hash))
    }

    /// Hashes the given bytes.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(Some(ContentHash::from_bytes(data)))
    }

    /// Returns the digest, or `None` for the sentinel.
    pub fn content_hash(&self) -> Option<ContentHash> {
        self.0
    }

    /// Returns `true` for the sentinel.
    pub fn is_unknown(&self) -> bool {
        self.0.is_none()
    }

    /// Returns `true` if both sides are known and identical.
    pub fn matches(&self, other: &FileHash) -> bool {
        matches!((self.0, other.0), (Some(a), Some(b)) if a == b)
    }
}

impl From<ContentHash> for FileHash {
    fn from(hash: ContentHash) -> Self {
        Self::known(hash)
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(hash) => write!(f, "{hash}"),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(hash) => write!(f, "FileHash({hash:?})"),
            None => f.write_str("FileHash(unknown)"),
        }
    }
}

impl FromStr for FileHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::UNKNOWN);
        }
        s.parse().map(Self::known)
    }
}

impl Serialize for FileHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FileHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
