//! Shared helpers for CLI commands: workspace resolution and candidate lookup.

use std::path::{Path, PathBuf};

use kestrel_config::{ProjectConfig, CONFIG_FILE};
use kestrel_engine::discover_candidates;

use crate::GlobalArgs;

/// A resolved workspace root together with its configuration.
#[derive(Debug)]
pub struct Workspace {
    /// Absolute workspace root.
    pub root: PathBuf,
    /// Parsed `kestrel.toml`, or defaults.
    pub config: ProjectConfig,
}

/// Walks up from `start` looking for the nearest directory containing `kestrel.toml`.
///
/// Falls back to `start` itself when no configuration file is found, so
/// unconfigured workspaces run with defaults.
pub fn find_project_root(start: &Path) -> PathBuf {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).is_file() {
            return current;
        }
        if !current.pop() {
            return start.to_path_buf();
        }
    }
}

/// Resolves the workspace and loads its configuration.
///
/// If `--config` is given, a file is loaded directly and its directory is the
/// root; a directory is taken as the root. Otherwise the root is searched
/// upward from the current directory.
pub fn load_workspace(global: &GlobalArgs) -> Result<Workspace, Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    let Some(config_path) = &global.config else {
        let root = find_project_root(&cwd);
        let config = kestrel_config::load_config(&root)?;
        return Ok(Workspace { root, config });
    };

    let path = cwd.join(config_path);
    if path.is_file() {
        let root = path.parent().map(Path::to_path_buf).unwrap_or(cwd);
        let config = kestrel_config::load_config_file(&path)?;
        Ok(Workspace { root, config })
    } else if path.is_dir() {
        let config = kestrel_config::load_config(&path)?;
        Ok(Workspace { root: path, config })
    } else {
        Err(format!("config path {} does not exist", path.display()).into())
    }
}

/// Lists analysis candidates for the given arguments.
///
/// With no paths the whole workspace is searched. Directories are searched
/// with the configured include and exclude rules; files are taken as given.
pub fn resolve_candidates(
    workspace: &Workspace,
    cache_dir: &Path,
    paths: &[String],
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    if paths.is_empty() {
        return Ok(discover_candidates(
            &workspace.root,
            &workspace.config.analysis,
            cache_dir,
        )?);
    }

    let cwd = std::env::current_dir()?;
    let mut candidates = Vec::new();
    for path in paths {
        let path = cwd.join(path);
        if path.is_dir() {
            candidates.extend(discover_candidates(
                &path,
                &workspace.config.analysis,
                cache_dir,
            )?);
        } else {
            candidates.push(path);
        }
    }
    Ok(candidates)
}

/// Recorded keys whose file no longer exists under the workspace.
pub fn missing_files<'a>(
    root: &Path,
    keys: impl IntoIterator<Item = &'a String>,
) -> Vec<&'a String> {
    keys.into_iter()
        .filter(|key| !root.join(key.as_str()).exists())
        .collect()
}
