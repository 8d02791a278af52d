//! Change detection against the last committed file hashes.
//!
//! Computes content hashes for candidate files and compares them against the
//! database to split the candidates into changed and unchanged sets. A file is
//! unchanged only when its recorded hash is known and equal to the new one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use kestrel_common::FileHash;
use tracing::{debug, warn};

use crate::hasher::ContentHasher;
use crate::vcs::{VcsSource, VcsSnapshot};

/// Files found clean in version control after hashing, with the commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcsObservation {
    /// The checked-out commit.
    pub head: String,
    /// Candidate keys that were tracked and unmodified.
    pub clean: BTreeSet<String>,
}

/// Result of comparing current file hashes against the committed hashes.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Files that are new, modified, or could not be hashed.
    pub changed: Vec<String>,

    /// Files whose content matches the committed hash.
    pub unchanged: Vec<String>,

    /// Files with a committed hash that are not among the candidates.
    pub deleted: Vec<String>,

    /// Current hash of every candidate, ready to commit after analysis.
    pub hashes: BTreeMap<String, FileHash>,

    /// Version-control state observed during this pass, if the fast path ran.
    pub vcs: Option<VcsObservation>,

    /// Number of candidates whose hashing was skipped by the fast path.
    pub vcs_skipped: usize,
}

impl ChangeSet {
    /// Returns `true` if nothing changed and nothing was deleted.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }

    /// Returns the number of files that need analysis.
    pub fn dirty_count(&self) -> usize {
        self.changed.len()
    }

    /// Returns `true` if the key was classified as unchanged.
    pub fn is_unchanged(&self, key: &str) -> bool {
        self.unchanged.binary_search_by(|k| k.as_str().cmp(key)).is_ok()
    }
}

/// The committed state change detection compares against.
#[derive(Debug, Clone, Copy)]
pub struct Baseline<'a> {
    /// Last committed hash per file key.
    pub files: &'a BTreeMap<String, FileHash>,
    /// Keys committed while clean, with the commit they were clean at.
    pub vcs_clean: &'a BTreeMap<String, String>,
}

/// Classifies candidate files as changed or unchanged.
pub struct ChangeSetResolver<'a> {
    workspace: &'a Path,
    hasher: &'a ContentHasher,
    vcs: Option<&'a dyn VcsSource>,
}

impl<'a> ChangeSetResolver<'a> {
    /// Creates a resolver that hashes files relative to `workspace`.
    pub fn new(workspace: &'a Path, hasher: &'a ContentHasher) -> Self {
        Self {
            workspace,
            hasher,
            vcs: None,
        }
    }

    /// Enables the version-control fast path.
    pub fn with_vcs(mut self, source: &'a dyn VcsSource) -> Self {
        self.vcs = Some(source);
        self
    }

    /// Hashes the candidates and compares them against the baseline.
    ///
    /// With a VCS source, a candidate skips hashing only if it is clean now,
    /// was committed while clean at the same commit, and its committed hash
    /// is known. Snapshot failures silently fall back to hashing everything.
    pub fn resolve(&self, candidates: &[String], baseline: Baseline<'_>) -> ChangeSet {
        let before = self.vcs.and_then(|source| self.snapshot(source));

        let mut hashes = BTreeMap::new();
        let mut to_hash = Vec::new();
        for key in candidates {
            let reused = before.as_ref().and_then(|snapshot| {
                let committed = baseline.files.get(key)?;
                let clean_at = baseline.vcs_clean.get(key)?;
                (clean_at == &snapshot.head && snapshot.is_clean(key) && !committed.is_unknown())
                    .then_some(*committed)
            });
            match reused {
                Some(hash) => {
                    hashes.insert(key.clone(), hash);
                }
                None => to_hash.push(key.clone()),
            }
        }
        let vcs_skipped = hashes.len();

        let paths: Vec<PathBuf> = to_hash.iter().map(|k| self.workspace.join(k)).collect();
        let mut computed = self.hasher.hash_many(&paths);
        for (key, path) in to_hash.into_iter().zip(&paths) {
            let hash = computed.remove(path).unwrap_or(FileHash::UNKNOWN);
            hashes.insert(key, hash);
        }

        // Snapshot again so that only files still clean after hashing are
        // recorded as clean.
        let vcs = match (&before, self.vcs) {
            (Some(before), Some(source)) => self
                .snapshot(source)
                .filter(|after| after.head == before.head)
                .map(|after| VcsObservation {
                    head: after.head.clone(),
                    clean: candidates
                        .iter()
                        .filter(|k| before.is_clean(k) && after.is_clean(k))
                        .cloned()
                        .collect(),
                }),
            _ => None,
        };

        let mut change_set = classify(hashes, baseline.files);
        change_set.vcs = vcs;
        change_set.vcs_skipped = vcs_skipped;
        debug!(
            "change detection: {} changed, {} unchanged, {} deleted, {} hashes reused from VCS",
            change_set.changed.len(),
            change_set.unchanged.len(),
            change_set.deleted.len(),
            vcs_skipped
        );
        change_set
    }

    fn snapshot(&self, source: &dyn VcsSource) -> Option<VcsSnapshot> {
        match source.snapshot(self.workspace) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("VCS status unavailable, hashing every file: {e}");
                None
            }
        }
    }
}

/// Compares current hashes against committed hashes.
///
/// A file is unchanged iff its committed hash is known and equal to the
/// current one. Committed files absent from `current` are reported deleted.
pub fn classify(
    current: BTreeMap<String, FileHash>,
    committed: &BTreeMap<String, FileHash>,
) -> ChangeSet {
    let mut changed = Vec::new();
    let mut unchanged = Vec::new();

    for (key, hash) in &current {
        match committed.get(key) {
            Some(old) if old.matches(hash) => unchanged.push(key.clone()),
            _ => changed.push(key.clone()),
        }
    }

    let deleted = committed
        .keys()
        .filter(|k| !current.contains_key(*k))
        .cloned()
        .collect();

    ChangeSet {
        changed,
        unchanged,
        deleted,
        hashes: current,
        vcs: None,
        vcs_skipped: 0,
    }
}
