//! Incremental detector execution on top of the analysis cache.
//!
//! [`Orchestrator`] drives a set of [`Detector`]s over a workspace, replaying
//! cached findings for unchanged files and running the rest on a bounded
//! worker pool. The [`workspace`] module maps `kestrel.toml` settings onto
//! the cache and discovers candidate files.

#![warn(missing_docs)]

pub mod detector;
pub mod error;
pub mod orchestrator;
pub mod workspace;

pub use detector::{Detector, DetectorError};
pub use error::EngineError;
pub use orchestrator::{AnalysisReport, FileReport, Orchestrator, RunOptions, RunSummary};
pub use workspace::{cache_options, discover_candidates, open_cache};
