//! Parsing and validation of `kestrel.toml` workspace configuration files.
//!
//! This crate reads the optional configuration file and produces a strongly-typed
//! [`ProjectConfig`] covering the cache location and lifetime, the hasher size
//! limit, the VCS fast path, and orchestrator parallelism.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE};
pub use types::*;
