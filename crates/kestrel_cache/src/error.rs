//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// Most cache operations are fail-safe: errors result in cache misses or an
/// empty database rather than hard failures. Only persistence (`save`/`flush`)
/// surfaces these to callers; elsewhere they are logged and absorbed.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache or source files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A source file exceeds the hasher's size limit.
    #[error("{path} is {size} bytes, over the {limit}-byte hashing limit")]
    FileTooLarge {
        /// The oversized file.
        path: PathBuf,
        /// Observed size in bytes.
        size: u64,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// A persisted cache file could not be parsed.
    #[error("failed to parse cache file {path}: {reason}")]
    Parse {
        /// The cache file.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// A persisted cache file has an invalid or missing header.
    #[error("invalid cache header in {path}: {reason}")]
    InvalidHeader {
        /// The cache file.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the computed checksum of the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The cache file.
        path: PathBuf,
        /// The expected checksum from the header.
        expected: String,
        /// The actual checksum computed from the payload.
        actual: String,
    },

    /// The persisted format version does not match the current version.
    #[error("version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The cache file.
        path: PathBuf,
        /// The expected format version.
        expected: u32,
        /// The format version found in the file.
        actual: u32,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// A version-control source failed.
    #[error("`{command}` failed: {reason}")]
    Vcs {
        /// The command line that was run.
        command: String,
        /// Exit status or stderr summary.
        reason: String,
    },
}
