//! The incremental cache facade.
//!
//! [`IncrementalCache`] ties together the hasher, the change-set resolver, and
//! the result store behind the get/set contract detectors and the
//! orchestrator use. It is safe to share across detector threads: each
//! operation holds the database lock only for a single key read or write.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use kestrel_common::{ByteSize, FileHash, MaxAge};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::database::{CacheDatabase, CacheEntry, Miss};
use crate::error::CacheError;
use crate::hasher::ContentHasher;
use crate::resolver::{Baseline, ChangeSet, ChangeSetResolver, VcsObservation};
use crate::store::ResultStore;
use crate::vcs::{GitSource, VcsSource};

pub use kestrel_common::DEFAULT_CACHE_DIR;

/// Settings for opening an [`IncrementalCache`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Cache directory, relative to the workspace unless absolute.
    pub cache_dir: PathBuf,
    /// Lifetime of a cached entry.
    pub max_age: MaxAge,
    /// Files over this size are never hashed.
    pub max_file_size: ByteSize,
    /// Use `git` status to skip hashing clean files.
    pub vcs_fast_path: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_age: MaxAge::DEFAULT,
            max_file_size: ContentHasher::DEFAULT_MAX_FILE_SIZE,
            vcs_fast_path: false,
        }
    }
}

/// Counters and sizes describing the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Files with a committed hash.
    pub files: usize,
    /// Cached detector entries.
    pub entries: usize,
    /// Cached entries per detector name.
    pub per_detector: BTreeMap<String, usize>,
    /// Lookups served from the cache since opening.
    pub hits: usize,
    /// Lookups that missed since opening.
    pub misses: usize,
    /// When the database was last persisted.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Hashes observed by the latest change-detection pass.
#[derive(Debug, Default)]
struct Observation {
    hashes: HashMap<String, FileHash>,
    vcs: Option<VcsObservation>,
}

/// Content-hash-keyed memoization of detector results for one workspace.
pub struct IncrementalCache {
    workspace: PathBuf,
    store: ResultStore,
    hasher: ContentHasher,
    max_age: MaxAge,
    vcs: Option<Box<dyn VcsSource>>,
    db: Mutex<CacheDatabase>,
    observed: Mutex<Observation>,
    save_lock: Mutex<()>,
    dirty: AtomicBool,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl IncrementalCache {
    /// Opens the cache for a workspace, loading any persisted state.
    ///
    /// Missing or corrupt state yields an empty cache; this never fails.
    pub fn open(workspace: &Path, options: CacheOptions) -> Self {
        let cache_dir = workspace.join(&options.cache_dir);
        let store = ResultStore::new(&cache_dir);
        let db = store.load();
        let vcs: Option<Box<dyn VcsSource>> = if options.vcs_fast_path {
            Some(Box::new(GitSource))
        } else {
            None
        };

        Self {
            workspace: workspace.to_path_buf(),
            store,
            hasher: ContentHasher::new(options.max_file_size),
            max_age: options.max_age,
            vcs,
            db: Mutex::new(db),
            observed: Mutex::new(Observation::default()),
            save_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Replaces the version-control source used by the fast path.
    pub fn with_vcs_source(mut self, source: Box<dyn VcsSource>) -> Self {
        self.vcs = Some(source);
        self
    }

    /// Returns the workspace root.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Returns the cache directory.
    pub fn cache_dir(&self) -> &Path {
        self.store.dir()
    }

    /// Returns `true` if there are unsaved mutations.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Returns the database key for a path: workspace-relative, `/`-separated.
    ///
    /// Relative paths are taken as already workspace-relative. Absolute paths
    /// outside the workspace keep their full form.
    pub fn key_for(&self, path: &Path) -> String {
        file_key(&self.workspace, path)
    }

    /// Classifies candidate files as changed or unchanged.
    ///
    /// Does not modify the database: hashes are only committed through
    /// [`update_file_hashes`](Self::update_file_hashes) once analysis of a
    /// file has finished. The observed hashes replace those of any earlier
    /// pass and are used by later [`get`](Self::get)/[`set`](Self::set) calls.
    pub fn detect_changes(&self, candidates: &[PathBuf]) -> ChangeSet {
        let mut keys: Vec<String> = candidates.iter().map(|p| self.key_for(p)).collect();
        keys.sort();
        keys.dedup();

        let (files, vcs_clean) = {
            let db = lock(&self.db);
            (db.files.clone(), db.vcs_clean.clone())
        };
        let mut resolver = ChangeSetResolver::new(&self.workspace, &self.hasher);
        if let Some(source) = self.vcs.as_deref() {
            resolver = resolver.with_vcs(source);
        }
        let change_set = resolver.resolve(
            &keys,
            Baseline {
                files: &files,
                vcs_clean: &vcs_clean,
            },
        );

        *lock(&self.observed) = Observation {
            hashes: change_set
                .hashes
                .iter()
                .map(|(k, h)| (k.clone(), *h))
                .collect(),
            vcs: change_set.vcs.clone(),
        };
        change_set
    }

    /// Current content hash of a file: from the latest pass, else freshly computed.
    ///
    /// Hashes computed here are not remembered, so files outside any pass
    /// are re-read on every lookup.
    fn current_hash(&self, key: &str) -> FileHash {
        if let Some(hash) = lock(&self.observed).hashes.get(key) {
            return *hash;
        }
        self.hasher.hash(&self.workspace.join(key))
    }

    /// Looks up cached findings, explaining a miss.
    pub fn lookup<F: DeserializeOwned>(
        &self,
        path: &Path,
        detector: &str,
        detector_version: &str,
    ) -> Result<Vec<F>, Miss> {
        let key = self.key_for(path);
        let current = self.current_hash(&key);
        let now = Utc::now();

        let findings = {
            let db = lock(&self.db);
            let entry = db.entry(&key, detector).ok_or(Miss::Absent)?;
            entry.check(&current, detector_version, self.max_age.as_duration(), now)?;
            entry.findings.clone()
        };

        findings
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<F>, _>>()
            .map_err(|e| {
                warn!("cached findings of {detector} for {key} do not decode: {e}");
                Miss::Undecodable
            })
    }

    /// Returns cached findings if a valid entry exists, otherwise `None`.
    ///
    /// Valid means: not expired, computed against the file's current content
    /// hash, and produced by the requested detector version.
    pub fn get<F: DeserializeOwned>(
        &self,
        path: &Path,
        detector: &str,
        detector_version: &str,
    ) -> Option<Vec<F>> {
        match self.lookup(path, detector, detector_version) {
            Ok(findings) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("cache hit: {detector}@{detector_version} {}", path.display());
                Some(findings)
            }
            Err(miss) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "cache miss ({miss:?}): {detector}@{detector_version} {}",
                    path.display()
                );
                None
            }
        }
    }

    /// Stores findings for a file and detector, replacing any previous entry.
    ///
    /// The entry is stamped with the file's current content hash and the
    /// current time. Fails only if a finding cannot be serialized.
    pub fn set<F: Serialize>(
        &self,
        path: &Path,
        detector: &str,
        detector_version: &str,
        findings: &[F],
    ) -> Result<(), CacheError> {
        let key = self.key_for(path);
        let values = findings
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;
        let entry = CacheEntry::new(self.current_hash(&key), detector_version, values);

        lock(&self.db).insert_entry(&key, detector, entry);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Commits file hashes, typically once the files' analysis has finished.
    ///
    /// Files seen clean in version control during the latest pass, with the
    /// same hash, are recorded as such for the fast path.
    pub fn update_file_hashes(&self, hashes: &BTreeMap<String, FileHash>) {
        if hashes.is_empty() {
            return;
        }
        let clean_at: Vec<Option<String>> = {
            let observed = lock(&self.observed);
            hashes
                .iter()
                .map(|(key, hash)| {
                    observed
                        .vcs
                        .as_ref()
                        .filter(|obs| !hash.is_unknown() && obs.clean.contains(key))
                        .map(|obs| obs.head.clone())
                })
                .collect()
        };
        let mut db = lock(&self.db);
        for ((key, hash), head) in hashes.iter().zip(clean_at) {
            db.files.insert(key.clone(), *hash);
            match head {
                Some(head) => {
                    db.vcs_clean.insert(key.clone(), head);
                }
                None => {
                    db.vcs_clean.remove(key);
                }
            }
        }
        drop(db);
        self.dirty.store(true, Ordering::Release);
    }

    /// Removes hashes and results for the given files (deleted or renamed).
    ///
    /// Returns the number of files that had cached state.
    pub fn invalidate(&self, paths: &[PathBuf]) -> usize {
        let keys: Vec<String> = paths.iter().map(|p| self.key_for(p)).collect();
        {
            let mut observed = lock(&self.observed);
            for key in &keys {
                observed.hashes.remove(key);
            }
        }
        let removed = lock(&self.db).clear_files(&keys);
        if removed > 0 {
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    /// Discards the whole database in memory. The next save persists the empty state.
    pub fn reset(&self) {
        lock(&self.db).reset();
        *lock(&self.observed) = Observation::default();
        self.dirty.store(true, Ordering::Release);
    }

    /// Removes expired entries. Returns the number removed.
    pub fn prune_expired(&self) -> usize {
        let removed = lock(&self.db).prune_expired(self.max_age.as_duration(), Utc::now());
        if removed > 0 {
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    /// Persists the database if anything changed since the last save.
    ///
    /// Returns `Ok(false)` without touching the disk when nothing changed.
    pub fn save(&self) -> Result<bool, CacheError> {
        if !self.is_dirty() {
            debug!("cache unchanged, skipping save");
            return Ok(false);
        }
        self.flush().map(|()| true)
    }

    /// Persists the database unconditionally.
    ///
    /// The snapshot is copied under the database lock and written outside
    /// it, so detectors are not blocked on disk I/O. Concurrent flushes are
    /// serialized. On failure the cache stays dirty and the previously
    /// persisted files are left intact.
    pub fn flush(&self) -> Result<(), CacheError> {
        let _saving = lock(&self.save_lock);
        self.dirty.store(false, Ordering::Release);
        let snapshot = lock(&self.db).clone();
        match self.store.save(&snapshot) {
            Ok(saved_at) => {
                lock(&self.db).last_updated = Some(saved_at);
                Ok(())
            }
            Err(e) => {
                self.dirty.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Returns a copy of the committed hash map.
    pub fn file_hashes(&self) -> BTreeMap<String, FileHash> {
        lock(&self.db).files.clone()
    }

    /// Returns counters and sizes describing the cache.
    pub fn stats(&self) -> CacheStats {
        let db = lock(&self.db);
        CacheStats {
            files: db.files.len(),
            entries: db.entry_count(),
            per_detector: db.entries_per_detector(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            last_updated: db.last_updated,
        }
    }
}

/// Normalizes a path into a database key relative to `workspace`.
pub fn file_key(workspace: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(workspace).unwrap_or(path);
    if relative.is_absolute() {
        return relative.to_string_lossy().replace('\\', "/");
    }
    let mut parts: Vec<String> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                if parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else {
                    parts.push("..".to_string());
                }
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    parts.join("/")
}
