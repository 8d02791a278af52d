//! Error types for the analysis engine.

use std::path::PathBuf;

/// Errors that prevent an analysis run from starting.
///
/// Failures of individual detectors or of persisting the cache are reported
/// inside the run's report instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A directory could not be read during candidate discovery.
    #[error("failed to read directory {path}: {source}")]
    Io {
        /// The directory being read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The worker pool could not be created.
    #[error("failed to start {jobs} worker threads: {reason}")]
    ThreadPool {
        /// Requested number of workers.
        jobs: usize,
        /// Description of the failure.
        reason: String,
    },
}
