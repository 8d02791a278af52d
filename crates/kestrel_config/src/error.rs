//! Error types for configuration loading and validation.

use std::path::PathBuf;

/// Errors that can occur when loading or validating a `kestrel.toml` configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML content could not be parsed or has unknown keys.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A field that must have a value is empty.
    #[error("`{field}` must not be empty")]
    Empty {
        /// Dotted field name, e.g. `cache.dir`.
        field: &'static str,
    },

    /// A field has a value outside its allowed range.
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with the value.
        reason: String,
    },
}
