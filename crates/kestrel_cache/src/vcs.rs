//! Version-control status queries for the change-detection fast path.
//!
//! A source reports which workspace files the VCS considers clean at the
//! current commit. The resolver only uses this to skip hashing files whose
//! last recorded hash was itself taken while the file was clean at the same
//! commit; content hashes stay the source of truth for everything else.

use std::collections::HashSet;
use std::path::Path;
use std::process::Command;

use crate::error::CacheError;

/// Working-tree status as reported by a version-control system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcsSnapshot {
    /// Identifier of the checked-out commit.
    pub head: String,
    /// Workspace-relative paths under version control.
    pub tracked: HashSet<String>,
    /// Workspace-relative paths that differ from `head` or are untracked.
    pub dirty: HashSet<String>,
}

impl VcsSnapshot {
    /// Returns `true` if the file is tracked and identical to `head`.
    pub fn is_clean(&self, key: &str) -> bool {
        self.tracked.contains(key) && !self.dirty.contains(key)
    }
}

/// Source of working-tree status.
pub trait VcsSource: Send + Sync {
    /// Takes a status snapshot of the workspace.
    fn snapshot(&self, workspace: &Path) -> Result<VcsSnapshot, CacheError>;
}

/// Source backed by the `git` command-line tool.
#[derive(Debug, Clone, Default)]
pub struct GitSource;

impl GitSource {
    fn run(workspace: &Path, args: &[&str]) -> Result<Vec<u8>, CacheError> {
        let command = format!("git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(workspace)
            .output()
            .map_err(|e| CacheError::Vcs {
                command: command.clone(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(CacheError::Vcs {
                command,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

impl VcsSource for GitSource {
    fn snapshot(&self, workspace: &Path) -> Result<VcsSnapshot, CacheError> {
        let head = String::from_utf8_lossy(&Self::run(workspace, &["rev-parse", "HEAD"])?)
            .trim()
            .to_string();
        let tracked = parse_nul_list(&Self::run(workspace, &["ls-files", "-z"])?);
        let mut dirty = parse_nul_list(&Self::run(
            workspace,
            &["diff", "--name-only", "--relative", "-z", "HEAD"],
        )?);
        dirty.extend(parse_nul_list(&Self::run(
            workspace,
            &["ls-files", "--others", "-z"],
        )?));
        Ok(VcsSnapshot {
            head,
            tracked,
            dirty,
        })
    }
}

/// Splits NUL-terminated path output (`git ... -z`) into a set.
pub fn parse_nul_list(output: &[u8]) -> HashSet<String> {
    output
        .split(|&b| b == 0)
        .filter(|entry| !entry.is_empty())
        .map(|entry| String::from_utf8_lossy(entry).into_owned())
        .collect()
}
