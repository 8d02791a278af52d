//! Cache entry lifetimes with unit parsing and display.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const MS_PER_S: u64 = 1_000;
const MS_PER_M: u64 = 60 * MS_PER_S;
const MS_PER_H: u64 = 60 * MS_PER_M;
const MS_PER_D: u64 = 24 * MS_PER_H;

/// The maximum age of a cache entry before it is considered expired.
///
/// Supports parsing from strings like "7d", "12h", "30m", "45s", "250ms",
/// and bare numeric values (interpreted as seconds). Millisecond precision.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MaxAge(Duration);

impl MaxAge {
    /// Seven days, the default lifetime of a cached result.
    pub const DEFAULT: Self = Self(Duration::from_millis(7 * MS_PER_D));

    /// Creates a max age from a duration.
    pub fn new(duration: Duration) -> Self {
        Self(duration)
    }

    /// Creates a max age from a number of milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    /// Returns the lifetime as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl Default for MaxAge {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Debug for MaxAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MaxAge({self})")
    }
}

impl fmt::Display for MaxAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.as_millis() as u64;
        if ms == 0 {
            return write!(f, "0ms");
        }
        for (unit, scale) in [
            ("d", MS_PER_D),
            ("h", MS_PER_H),
            ("m", MS_PER_M),
            ("s", MS_PER_S),
        ] {
            if ms % scale == 0 {
                return write!(f, "{}{unit}", ms / scale);
            }
        }
        write!(f, "{ms}ms")
    }
}

/// Error type for parsing max-age strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid max age: '{input}'")]
pub struct ParseMaxAgeError {
    /// The input string that failed to parse.
    pub input: String,
}

impl FromStr for MaxAge {
    type Err = ParseMaxAgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseMaxAgeError {
            input: s.to_string(),
        };

        let digit_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        if digit_end == 0 {
            return Err(err());
        }
        let value: u64 = s[..digit_end].parse().map_err(|_| err())?;

        let scale = match s[digit_end..].trim().to_ascii_lowercase().as_str() {
            "ms" => 1,
            "" | "s" => MS_PER_S,
            "m" => MS_PER_M,
            "h" => MS_PER_H,
            "d" => MS_PER_D,
            _ => return Err(err()),
        };

        value
            .checked_mul(scale)
            .map(MaxAge::from_millis)
            .ok_or_else(err)
    }
}

impl Serialize for MaxAge {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MaxAge {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
