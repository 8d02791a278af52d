//! Default settings shared by the configuration file and the cache.

use crate::size::ByteSize;

/// Workspace-relative cache directory.
pub const DEFAULT_CACHE_DIR: &str = ".kestrel-cache";

/// Files larger than this are never hashed.
pub const DEFAULT_MAX_FILE_SIZE: ByteSize = ByteSize::mb(50);
