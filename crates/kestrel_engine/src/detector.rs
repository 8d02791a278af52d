//! The contract between detectors and the orchestrator.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A static-analysis pass that produces findings for one file at a time.
///
/// `name` must be stable across runs. `version` must change whenever the
/// detector's matching logic changes meaning, which invalidates every result
/// cached by earlier versions.
pub trait Detector: Send + Sync {
    /// Finding record produced by this detector. Opaque to the cache.
    type Finding: Serialize + DeserializeOwned + Send;

    /// Stable detector name, used as the cache key.
    fn name(&self) -> &str;

    /// Version of the detector's logic.
    fn version(&self) -> &str;

    /// Analyzes a single file, returning findings in a meaningful order.
    fn analyze(&self, path: &Path) -> Result<Vec<Self::Finding>, DetectorError>;
}

/// Errors reported by a detector for a single file.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file being analyzed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The detector could not analyze the file.
    #[error("analysis of {path} failed: {reason}")]
    Failed {
        /// The file being analyzed.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },
}
