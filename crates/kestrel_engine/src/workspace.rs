//! Opening a workspace: cache settings and candidate discovery from config.

use std::path::{Path, PathBuf};

use kestrel_cache::{CacheOptions, IncrementalCache};
use kestrel_config::{AnalysisConfig, CacheConfig, ProjectConfig};

use crate::error::EngineError;

/// Converts the `[cache]` section into cache options.
pub fn cache_options(config: &CacheConfig) -> CacheOptions {
    CacheOptions {
        cache_dir: PathBuf::from(&config.dir),
        max_age: config.max_age,
        max_file_size: config.max_file_size,
        vcs_fast_path: config.vcs_fast_path,
    }
}

/// Opens the workspace cache as configured.
pub fn open_cache(workspace: &Path, config: &ProjectConfig) -> IncrementalCache {
    IncrementalCache::open(workspace, cache_options(&config.cache))
}

/// Finds analysis candidates under `workspace`, sorted by path.
///
/// Files are included by extension. Directories named in `exclude_dirs`, the
/// cache directory, and symbolic links are skipped.
pub fn discover_candidates(
    workspace: &Path,
    analysis: &AnalysisConfig,
    cache_dir: &Path,
) -> Result<Vec<PathBuf>, EngineError> {
    let mut files = Vec::new();
    walk(workspace, analysis, cache_dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(
    dir: &Path,
    analysis: &AnalysisConfig,
    cache_dir: &Path,
    files: &mut Vec<PathBuf>,
) -> Result<(), EngineError> {
    let io_err = |source| EngineError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let file_type = entry.file_type().map_err(io_err)?;
        let path = entry.path();
        if file_type.is_dir() {
            let excluded = entry
                .file_name()
                .to_str()
                .is_some_and(|name| analysis.exclude_dirs.iter().any(|d| d == name));
            if !excluded && path != cache_dir {
                walk(&path, analysis, cache_dir, files)?;
            }
        } else if file_type.is_file() && is_included(&path, &analysis.include) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_included(path: &Path, include: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| include.iter().any(|i| i.eq_ignore_ascii_case(ext)))
}
