//! Incremental analysis cache.
//!
//! This crate lets a static-analysis pipeline skip detectors on files whose
//! content has not changed since the previous run. It hashes file contents,
//! classifies candidates as changed or unchanged, memoizes per-detector
//! findings keyed by content hash and detector version, and persists all of
//! it under a workspace cache directory. Missing or corrupt state always
//! degrades to an empty cache, never to an error.

#![warn(missing_docs)]

pub mod cache;
pub mod database;
pub mod error;
pub mod hasher;
pub mod resolver;
pub mod store;
pub mod vcs;

pub use cache::{file_key, CacheOptions, CacheStats, IncrementalCache, DEFAULT_CACHE_DIR};
pub use database::{CacheDatabase, CacheEntry, Miss};
pub use error::CacheError;
pub use hasher::ContentHasher;
pub use resolver::{ChangeSet, ChangeSetResolver};
pub use store::ResultStore;
pub use vcs::{GitSource, VcsSource, VcsSnapshot};
