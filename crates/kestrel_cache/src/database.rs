//! The in-memory cache database: file hashes and per-detector results.
//!
//! The database is the aggregate root persisted by the
//! [`ResultStore`](crate::store::ResultStore). It maps workspace-relative file
//! keys to their last committed content hash, and to the memoized output of
//! every detector that ran on them.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use kestrel_common::FileHash;
use serde::{Deserialize, Serialize};

/// Detector name → cached entry, for a single file.
pub type DetectorResults = BTreeMap<String, CacheEntry>;

/// One detector's memoized output for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Content hash of the file the findings were computed against.
    pub file_hash: FileHash,

    /// When the entry was stored.
    pub timestamp: DateTime<Utc>,

    /// Version of the detector that produced the findings.
    pub detector_version: String,

    /// Detector-defined records, stored without interpretation.
    pub findings: Vec<serde_json::Value>,
}

/// Why a lookup did not produce a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Miss {
    /// No entry exists for the file and detector.
    Absent,
    /// The entry is older than the configured max age.
    Expired,
    /// The file's current content hash differs from the entry's (or is unknown).
    ContentChanged,
    /// The entry was produced by a different detector version.
    VersionMismatch,
    /// The stored findings do not decode into the requested record type.
    Undecodable,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(file_hash: FileHash, detector_version: &str, findings: Vec<serde_json::Value>) -> Self {
        Self {
            file_hash,
            timestamp: Utc::now(),
            detector_version: detector_version.to_string(),
            findings,
        }
    }

    /// Returns `true` if the entry is older than `max_age` at `now`.
    pub fn is_expired(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(self.timestamp) > max_age
    }

    /// Checks every validity condition for serving this entry.
    pub fn check(
        &self,
        current_hash: &FileHash,
        detector_version: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), Miss> {
        if self.is_expired(max_age, now) {
            return Err(Miss::Expired);
        }
        if !self.file_hash.matches(current_hash) {
            return Err(Miss::ContentChanged);
        }
        if self.detector_version != detector_version {
            return Err(Miss::VersionMismatch);
        }
        Ok(())
    }
}

/// The persisted aggregate: file hashes plus detector results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheDatabase {
    /// Last committed content hash per file key.
    pub files: BTreeMap<String, FileHash>,

    /// Cached results per file key and detector name.
    pub results: BTreeMap<String, DetectorResults>,

    /// Files whose committed hash was taken while clean in version control,
    /// with the commit they were clean at.
    pub vcs_clean: BTreeMap<String, String>,

    /// When the database was last persisted.
    pub last_updated: Option<DateTime<Utc>>,
}

impl CacheDatabase {
    /// Schema version of the persisted layout. Increment on breaking changes.
    pub const FORMAT_VERSION: u32 = 1;

    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the database holds no hashes and no results.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.results.is_empty()
    }

    /// Returns the entry for a file and detector, if any.
    pub fn entry(&self, key: &str, detector: &str) -> Option<&CacheEntry> {
        self.results.get(key)?.get(detector)
    }

    /// Inserts or replaces the entry for a file and detector.
    pub fn insert_entry(&mut self, key: &str, detector: &str, entry: CacheEntry) {
        self.results
            .entry(key.to_string())
            .or_default()
            .insert(detector.to_string(), entry);
    }

    /// Removes hashes and all detector results for the given keys.
    ///
    /// Returns the number of keys that had any state.
    pub fn clear_files<S: AsRef<str>>(&mut self, keys: &[S]) -> usize {
        let mut removed = 0;
        for key in keys {
            let key = key.as_ref();
            let had_hash = self.files.remove(key).is_some();
            let had_results = self.results.remove(key).is_some();
            self.vcs_clean.remove(key);
            if had_hash || had_results {
                removed += 1;
            }
        }
        removed
    }

    /// Discards all state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Removes entries older than `max_age`, and files left without entries.
    ///
    /// Returns the number of entries removed.
    pub fn prune_expired(&mut self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.results.retain(|_, detectors| {
            let before = detectors.len();
            detectors.retain(|_, entry| !entry.is_expired(max_age, now));
            removed += before - detectors.len();
            !detectors.is_empty()
        });
        removed
    }

    /// Total number of cached detector entries.
    pub fn entry_count(&self) -> usize {
        self.results.values().map(BTreeMap::len).sum()
    }

    /// Number of cached entries per detector name.
    pub fn entries_per_detector(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for detector in self.results.values().flat_map(BTreeMap::keys) {
            *counts.entry(detector.clone()).or_insert(0) += 1;
        }
        counts
    }
}
