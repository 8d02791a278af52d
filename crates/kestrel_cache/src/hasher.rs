//! Source file content hashing.
//!
//! Hashes are computed from file bytes, never from timestamps, so touching a
//! file leaves its hash unchanged and reverting an edit restores it. Files
//! that cannot be hashed get the [`FileHash::UNKNOWN`] sentinel, which never
//! compares equal to anything and so forces re-analysis.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use kestrel_common::{ByteSize, ContentHash, FileHash};
use rayon::prelude::*;
use tracing::warn;

use crate::error::CacheError;

/// Computes content hashes of source files, refusing files over a size limit.
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    max_file_size: ByteSize,
}

impl ContentHasher {
    /// Default size limit: 50 MB.
    pub const DEFAULT_MAX_FILE_SIZE: ByteSize = kestrel_common::DEFAULT_MAX_FILE_SIZE;

    /// Creates a hasher with the given size limit.
    pub fn new(max_file_size: ByteSize) -> Self {
        Self { max_file_size }
    }

    /// Returns the configured size limit.
    pub fn max_file_size(&self) -> ByteSize {
        self.max_file_size
    }

    /// Computes the content hash of a single file.
    ///
    /// Reads at most one byte past the limit, so a file that grows while
    /// being read is still refused without buffering it whole.
    pub fn try_hash(&self, path: &Path) -> Result<ContentHash, CacheError> {
        let io_err = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };
        let limit = self.max_file_size.bytes();
        let file = std::fs::File::open(path).map_err(io_err)?;
        let size = file.metadata().map_err(io_err)?.len();
        if size > limit {
            return Err(CacheError::FileTooLarge {
                path: path.to_path_buf(),
                size,
                limit,
            });
        }

        let mut content = Vec::with_capacity(size as usize);
        file.take(limit.saturating_add(1))
            .read_to_end(&mut content)
            .map_err(io_err)?;
        if content.len() as u64 > limit {
            return Err(CacheError::FileTooLarge {
                path: path.to_path_buf(),
                size: content.len() as u64,
                limit,
            });
        }
        Ok(ContentHash::from_bytes(&content))
    }

    /// Computes the hash of a single file, or the unknown sentinel on failure.
    pub fn hash(&self, path: &Path) -> FileHash {
        match self.try_hash(path) {
            Ok(hash) => FileHash::known(hash),
            Err(e) => {
                warn!("cannot hash {}, it will be re-analyzed: {e}", path.display());
                FileHash::UNKNOWN
            }
        }
    }

    /// Computes hashes for multiple files in parallel.
    ///
    /// Every input path appears in the result; files that fail individually
    /// map to the unknown sentinel without affecting the others.
    pub fn hash_many(&self, paths: &[PathBuf]) -> BTreeMap<PathBuf, FileHash> {
        paths
            .par_iter()
            .map(|path| (path.clone(), self.hash(path)))
            .collect()
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_FILE_SIZE)
    }
}
