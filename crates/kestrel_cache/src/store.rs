//! Durable persistence of the [`CacheDatabase`].
//!
//! The database is written as two files in the cache directory:
//!
//! - `hashes.json`: file key → content hash, plus version-control state
//! - `results.json`: file key → detector name → cached entry
//!
//! Neither file is a single JSON document. Each is a compact JSON header on
//! the first line, a newline, then a pretty-printed JSON payload:
//!
//! ```text
//! {"magic":"kestrel-cache","format_version":1,"last_updated":"...","checksum":"<xxh3-128 hex>"}
//! {
//!   "files": { "src/a.ts": "<sha-256 hex>", "big.bin": "" },
//!   "vcs_clean": { "src/a.ts": "<commit>" }
//! }
//! ```
//!
//! The `files` object of `hashes.json` is the plain file key → hash map, with
//! `""` for the unknown hash. `results.json` carries the nested
//! file → detector → entry map as its whole payload. The checksum covers the
//! payload bytes after the newline. Files are written to a temporary sibling
//! and renamed into place, so a failed write never leaves a half-written file
//! behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use kestrel_common::FileHash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::{CacheDatabase, DetectorResults};
use crate::error::CacheError;

/// Name of the hash-map file within the cache directory.
pub const HASHES_FILE: &str = "hashes.json";

/// Name of the results file within the cache directory.
pub const RESULTS_FILE: &str = "results.json";

/// Magic string identifying a Kestrel cache file.
const MAGIC: &str = "kestrel-cache";

/// First line of every persisted cache file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotHeader {
    magic: String,
    format_version: u32,
    last_updated: DateTime<Utc>,
    checksum: String,
}

/// Payload of `hashes.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HashTable {
    files: BTreeMap<String, FileHash>,
    #[serde(default)]
    vcs_clean: BTreeMap<String, String>,
}

/// Reads and writes the cache database under a cache directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    /// Creates a store rooted at the given cache directory.
    ///
    /// The directory is not created until the first save.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the hash-map file.
    pub fn hashes_path(&self) -> PathBuf {
        self.dir.join(HASHES_FILE)
    }

    /// Path of the results file.
    pub fn results_path(&self) -> PathBuf {
        self.dir.join(RESULTS_FILE)
    }

    /// Loads the database, falling back to an empty one.
    ///
    /// Missing files mean a first run. Corrupt or incompatible files are
    /// logged and discarded. Never fails.
    pub fn load(&self) -> CacheDatabase {
        match self.try_load() {
            Ok(Some(db)) => {
                debug!(
                    "loaded cache from {}: {} files, {} entries",
                    self.dir.display(),
                    db.files.len(),
                    db.entry_count()
                );
                db
            }
            Ok(None) => CacheDatabase::new(),
            Err(e) => {
                warn!("discarding unusable cache, starting fresh: {e}");
                CacheDatabase::new()
            }
        }
    }

    /// Loads the database, reporting why it could not be used.
    ///
    /// Returns `Ok(None)` when neither file exists. If only one exists the
    /// other half starts empty. Any unreadable, corrupt, or incompatible file
    /// is an error, and the whole database should then be discarded.
    pub fn try_load(&self) -> Result<Option<CacheDatabase>, CacheError> {
        let hashes = read_snapshot::<HashTable>(&self.hashes_path())?;
        let results = read_snapshot::<BTreeMap<String, DetectorResults>>(&self.results_path())?;
        if hashes.is_none() && results.is_none() {
            return Ok(None);
        }

        let mut db = CacheDatabase::new();
        let mut last_updated = None;
        if let Some((header, table)) = hashes {
            db.files = table.files;
            db.vcs_clean = table.vcs_clean;
            last_updated = Some(header.last_updated);
        }
        if let Some((header, results)) = results {
            db.results = results;
            last_updated = last_updated.max(Some(header.last_updated));
        }
        db.last_updated = last_updated;
        Ok(Some(db))
    }

    /// Writes a complete snapshot of the database.
    ///
    /// Creates the cache directory if needed. Returns the timestamp recorded
    /// in the written headers.
    pub fn save(&self, db: &CacheDatabase) -> Result<DateTime<Utc>, CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let now = Utc::now();

        write_snapshot(&self.results_path(), &db.results, now)?;
        let table = HashTable {
            files: db.files.clone(),
            vcs_clean: db.vcs_clean.clone(),
        };
        write_snapshot(&self.hashes_path(), &table, now)?;

        debug!(
            "saved cache to {}: {} files, {} entries",
            self.dir.display(),
            db.files.len(),
            db.entry_count()
        );
        Ok(now)
    }
}

fn checksum(payload: &[u8]) -> String {
    format!("{:032x}", xxhash_rust::xxh3::xxh3_128(payload))
}

/// Serializes `payload` behind a header and atomically replaces `path`.
fn write_snapshot<T: Serialize>(
    path: &Path,
    payload: &T,
    now: DateTime<Utc>,
) -> Result<(), CacheError> {
    let ser_err = |e: serde_json::Error| CacheError::Serialization {
        reason: e.to_string(),
    };
    let body = serde_json::to_vec_pretty(payload).map_err(ser_err)?;
    let header = SnapshotHeader {
        magic: MAGIC.to_string(),
        format_version: CacheDatabase::FORMAT_VERSION,
        last_updated: now,
        checksum: checksum(&body),
    };

    let mut output = serde_json::to_vec(&header).map_err(ser_err)?;
    output.push(b'\n');
    output.extend_from_slice(&body);

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!("{file_name}.{}.tmp", std::process::id()));
    if let Err(e) = std::fs::write(&tmp_path, &output) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(CacheError::Io {
            path: tmp_path,
            source: e,
        });
    }
    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

/// Reads and validates a snapshot. `Ok(None)` if the file does not exist.
fn read_snapshot<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<(SnapshotHeader, T)>, CacheError> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let invalid = |reason: &str| CacheError::InvalidHeader {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let split = content
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| invalid("missing header line"))?;
    let (header_bytes, body) = (&content[..split], &content[split + 1..]);

    let header: SnapshotHeader =
        serde_json::from_slice(header_bytes).map_err(|e| invalid(&e.to_string()))?;
    if header.magic != MAGIC {
        return Err(invalid("bad magic"));
    }
    if header.format_version != CacheDatabase::FORMAT_VERSION {
        return Err(CacheError::VersionMismatch {
            path: path.to_path_buf(),
            expected: CacheDatabase::FORMAT_VERSION,
            actual: header.format_version,
        });
    }
    let actual = checksum(body);
    if actual != header.checksum {
        return Err(CacheError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: header.checksum,
            actual,
        });
    }

    let payload = serde_json::from_slice(body).map_err(|e| CacheError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(Some((header, payload)))
}
