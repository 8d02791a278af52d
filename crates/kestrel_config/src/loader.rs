//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::path::Path;

/// Name of the configuration file at the workspace root.
pub const CONFIG_FILE: &str = "kestrel.toml";

/// Loads and validates `kestrel.toml` from a workspace directory.
///
/// A missing file is not an error: the workspace runs with defaults.
pub fn load_config(workspace_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = workspace_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(ProjectConfig::default());
    }
    load_config_file(&config_path)
}

/// Loads and validates a configuration from an explicit file path.
///
/// Unlike [`load_config`], the file must exist.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_from_str(&content)
}

/// Parses and validates a `kestrel.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and values are consistent.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.cache.dir.trim().is_empty() {
        return Err(ConfigError::Empty { field: "cache.dir" });
    }
    if Path::new(&config.cache.dir).is_absolute() {
        return Err(ConfigError::Invalid {
            field: "cache.dir",
            reason: format!("must be workspace-relative, got '{}'", config.cache.dir),
        });
    }
    if config.analysis.include.is_empty() {
        return Err(ConfigError::Empty {
            field: "analysis.include",
        });
    }
    if let Some(ext) = config
        .analysis
        .include
        .iter()
        .find(|ext| ext.is_empty() || ext.starts_with('.'))
    {
        return Err(ConfigError::Invalid {
            field: "analysis.include",
            reason: format!("entries are bare extensions, got '{ext}'"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_common::{ByteSize, MaxAge};

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.cache.dir, ".kestrel-cache");
        assert_eq!(config.cache.max_age, MaxAge::DEFAULT);
        assert_eq!(config.cache.max_file_size, ByteSize::mb(50));
        assert!(!config.cache.vcs_fast_path);
        assert_eq!(config.analysis.jobs, 0);
        assert_eq!(config.analysis.checkpoint_every, 0);
        assert!(config.analysis.include.contains(&"ts".to_string()));
        assert!(config.analysis.exclude_dirs.contains(&".git".to_string()));
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[cache]
dir = "build/.cache"
max_age = "12h"
max_file_size = "2MB"
vcs_fast_path = true

[analysis]
jobs = 4
checkpoint_every = 100
include = ["ts", "py"]
exclude_dirs = ["vendor"]
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.cache.dir, "build/.cache");
        assert_eq!(config.cache.max_age.as_duration().as_secs(), 12 * 3600);
        assert_eq!(config.cache.max_file_size.bytes(), 2 * 1024 * 1024);
        assert!(config.cache.vcs_fast_path);
        assert_eq!(config.analysis.jobs, 4);
        assert_eq!(config.analysis.checkpoint_every, 100);
        assert_eq!(config.analysis.include, vec!["ts", "py"]);
        assert_eq!(config.analysis.exclude_dirs, vec!["vendor"]);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let toml = r#"
[cache]
max_age = "1d"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.cache.dir, ".kestrel-cache");
        assert_eq!(config.cache.max_age.as_duration().as_secs(), 86_400);
    }

    #[test]
    fn empty_dir_errors() {
        let toml = r#"
[cache]
dir = ""
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Empty { .. }));
    }

    #[test]
    fn absolute_dir_errors() {
        let toml = r#"
[cache]
dir = "/var/cache/kestrel"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn empty_include_errors() {
        let toml = r#"
[analysis]
include = []
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Empty { .. }));
    }

    #[test]
    fn dotted_extension_errors() {
        let toml = r#"
[analysis]
include = [".ts"]
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn bad_max_age_is_parse_error() {
        let toml = r#"
[cache]
max_age = "forever"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_field_is_parse_error() {
        let toml = r#"
[cache]
ttl = "1d"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.cache.dir, ".kestrel-cache");
    }

    #[test]
    fn loads_file_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[analysis]\njobs = 2\n").unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.analysis.jobs, 2);
    }

    #[test]
    fn explicit_missing_file_is_io_error() {
        let err = load_config_file(Path::new("/nonexistent/dir/kestrel.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
