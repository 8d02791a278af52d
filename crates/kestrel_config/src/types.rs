//! Configuration types deserialized from `kestrel.toml`.

use kestrel_common::{ByteSize, MaxAge, DEFAULT_MAX_FILE_SIZE};
use serde::Deserialize;

pub use kestrel_common::DEFAULT_CACHE_DIR;

/// The top-level project configuration parsed from `kestrel.toml`.
///
/// Every section is optional; a missing file yields [`ProjectConfig::default`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Cache location, lifetime, and change-detection settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Orchestrator settings (parallelism, checkpoints, file discovery).
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// The `[cache]` section.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Workspace-relative cache directory.
    pub dir: String,
    /// Lifetime of a cached detector result.
    pub max_age: MaxAge,
    /// Files larger than this are never hashed and always re-analyzed.
    pub max_file_size: ByteSize,
    /// Consult git to skip hashing files it reports clean.
    pub vcs_fast_path: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: DEFAULT_CACHE_DIR.to_string(),
            max_age: MaxAge::DEFAULT,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            vcs_fast_path: false,
        }
    }
}

/// The `[analysis]` section.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Worker threads for detector execution; `0` means one per CPU.
    pub jobs: usize,
    /// Flush the cache after every N completed files; `0` flushes only at the end.
    pub checkpoint_every: usize,
    /// File extensions (without the dot) considered analysis candidates.
    pub include: Vec<String>,
    /// Directory names skipped during discovery.
    pub exclude_dirs: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            checkpoint_every: 0,
            include: ["ts", "tsx", "js", "jsx", "py", "java", "go", "rs", "cs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_dirs: [".git", "node_modules", "target", "dist"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
