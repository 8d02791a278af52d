//! Shared foundational types used across the Kestrel analysis cache.
//!
//! This crate provides content hashing (with the "unknown" sentinel used for
//! unhashable files), cache entry lifetimes, and byte sizes with unit parsing.

#![warn(missing_docs)]

pub mod age;
pub mod defaults;
pub mod hash;
pub mod size;

pub use age::{MaxAge, ParseMaxAgeError};
pub use defaults::{DEFAULT_CACHE_DIR, DEFAULT_MAX_FILE_SIZE};
pub use hash::{ContentHash, FileHash, ParseHashError};
pub use size::{ByteSize, ParseByteSizeError};
