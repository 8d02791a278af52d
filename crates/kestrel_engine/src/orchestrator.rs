//! Incremental execution of detectors over a set of candidate files.
//!
//! A run classifies the candidates, replays cached findings where they are
//! still valid, runs detectors on a bounded worker pool for everything else,
//! and commits a file's hash only once every detector has succeeded on it.
//! The cache is flushed at the end of every run, including cancelled ones.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use kestrel_cache::{CacheError, ChangeSet, IncrementalCache};
use kestrel_common::FileHash;
use kestrel_config::AnalysisConfig;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::detector::Detector;
use crate::error::EngineError;

/// Worker pool and persistence settings for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Worker threads; `0` lets the pool pick one per CPU.
    pub jobs: usize,
    /// Save the cache after every N completed files; `0` saves only at the end.
    pub checkpoint_every: usize,
    /// Drop cached state for recorded files that no longer exist on disk.
    pub prune_deleted: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            jobs: 0,
            checkpoint_every: 0,
            prune_deleted: true,
        }
    }
}

impl RunOptions {
    /// Builds run options from the `[analysis]` section.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            jobs: config.jobs,
            checkpoint_every: config.checkpoint_every,
            ..Self::default()
        }
    }
}

/// Findings for one file, keyed by detector name.
#[derive(Debug)]
pub struct FileReport<F> {
    /// Findings of every detector that produced a result.
    pub findings: BTreeMap<String, Vec<F>>,
    /// `true` if every detector succeeded and its result was cached.
    pub complete: bool,
}

/// Counters describing a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Candidate files after normalization.
    pub candidates: usize,
    /// Candidates classified as changed.
    pub changed: usize,
    /// Candidates classified as unchanged.
    pub unchanged: usize,
    /// Deleted files whose cached state was dropped.
    pub pruned: usize,
    /// Detector results replayed from the cache.
    pub cache_hits: usize,
    /// Detector invocations.
    pub detector_runs: usize,
    /// Detector invocations that failed.
    pub detector_failures: usize,
    /// Files whose hash was committed.
    pub completed: usize,
    /// The run stopped early because cancellation was requested.
    pub cancelled: bool,
}

/// Outcome of [`Orchestrator::run`].
#[derive(Debug)]
pub struct AnalysisReport<F> {
    /// Per-file findings for every file that was started.
    pub files: BTreeMap<String, FileReport<F>>,
    /// Run counters.
    pub summary: RunSummary,
    /// Result of the final cache flush.
    pub persisted: Result<(), CacheError>,
}

#[derive(Default)]
struct Counters {
    cache_hits: AtomicUsize,
    detector_runs: AtomicUsize,
    detector_failures: AtomicUsize,
    completed: AtomicUsize,
}

type BoxedDetector<F> = Box<dyn Detector<Finding = F>>;

/// Runs a fixed set of detectors incrementally against an [`IncrementalCache`].
pub struct Orchestrator<'c, F>
where
    F: Serialize + DeserializeOwned + Send + 'static,
{
    cache: &'c IncrementalCache,
    detectors: Vec<BoxedDetector<F>>,
    options: RunOptions,
}

impl<'c, F> Orchestrator<'c, F>
where
    F: Serialize + DeserializeOwned + Send + 'static,
{
    /// Creates an orchestrator with no detectors.
    pub fn new(cache: &'c IncrementalCache, options: RunOptions) -> Self {
        Self {
            cache,
            detectors: Vec::new(),
            options,
        }
    }

    /// Adds a detector. Detectors run in registration order on each file.
    pub fn with_detector<D>(mut self, detector: D) -> Self
    where
        D: Detector<Finding = F> + 'static,
    {
        self.detectors.push(Box::new(detector));
        self
    }

    /// Analyzes `candidates`, reusing cached findings where valid.
    ///
    /// Setting `cancel` stops workers from starting new files; files already
    /// started finish their current detector and are left uncommitted.
    /// Only a failure to start the worker pool is an error.
    pub fn run(
        &self,
        candidates: &[PathBuf],
        cancel: &AtomicBool,
    ) -> Result<AnalysisReport<F>, EngineError> {
        let changes = self.cache.detect_changes(candidates);
        let pruned = if self.options.prune_deleted {
            self.prune_deleted(&changes.deleted)
        } else {
            0
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs)
            .build()
            .map_err(|e| EngineError::ThreadPool {
                jobs: self.options.jobs,
                reason: e.to_string(),
            })?;

        let work: Vec<(&str, bool)> = changes
            .changed
            .iter()
            .map(|k| (k.as_str(), false))
            .chain(changes.unchanged.iter().map(|k| (k.as_str(), true)))
            .collect();
        let counters = Counters::default();

        let files: BTreeMap<String, FileReport<F>> = pool.install(|| {
            work.par_iter()
                .filter_map(|&(key, unchanged)| {
                    let report = self.analyze_file(key, unchanged, &counters, cancel)?;
                    if report.complete {
                        self.commit(key, &changes, &counters);
                    }
                    Some((key.to_string(), report))
                })
                .collect()
        });

        let persisted = self.cache.flush();
        if let Err(e) = &persisted {
            warn!("failed to persist cache: {e}");
        }

        let summary = RunSummary {
            candidates: work.len(),
            changed: changes.changed.len(),
            unchanged: changes.unchanged.len(),
            pruned,
            cache_hits: counters.cache_hits.into_inner(),
            detector_runs: counters.detector_runs.into_inner(),
            detector_failures: counters.detector_failures.into_inner(),
            completed: counters.completed.into_inner(),
            cancelled: cancel.load(Ordering::Relaxed),
        };
        debug!("analysis run finished: {summary:?}");

        Ok(AnalysisReport {
            files,
            summary,
            persisted,
        })
    }

    /// Runs (or replays) every detector on one file.
    ///
    /// Returns `None` if cancellation was requested before the file started.
    fn analyze_file(
        &self,
        key: &str,
        unchanged: bool,
        counters: &Counters,
        cancel: &AtomicBool,
    ) -> Option<FileReport<F>> {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        let path = self.cache.workspace().join(key);
        let mut findings = BTreeMap::new();
        let mut complete = true;

        for detector in &self.detectors {
            let (name, version) = (detector.name(), detector.version());
            if unchanged {
                if let Some(cached) = self.cache.get::<F>(&path, name, version) {
                    counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    findings.insert(name.to_string(), cached);
                    continue;
                }
            }
            if cancel.load(Ordering::Relaxed) {
                complete = false;
                break;
            }

            counters.detector_runs.fetch_add(1, Ordering::Relaxed);
            match detector.analyze(&path) {
                Ok(found) => {
                    if let Err(e) = self.cache.set(&path, name, version, &found) {
                        warn!("cannot cache {name} results for {key}: {e}");
                        complete = false;
                    }
                    findings.insert(name.to_string(), found);
                }
                Err(e) => {
                    counters.detector_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("detector {name}@{version} failed: {e}");
                    complete = false;
                }
            }
        }

        Some(FileReport { findings, complete })
    }

    /// Commits the hash of a fully analyzed file and checkpoints if due.
    fn commit(&self, key: &str, changes: &ChangeSet, counters: &Counters) {
        let hash = changes
            .hashes
            .get(key)
            .copied()
            .unwrap_or(FileHash::UNKNOWN);
        self.cache
            .update_file_hashes(&BTreeMap::from([(key.to_string(), hash)]));

        let done = counters.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let every = self.options.checkpoint_every;
        if every > 0 && done % every == 0 {
            match self.cache.save() {
                Ok(_) => debug!("checkpoint after {done} files"),
                Err(e) => warn!("checkpoint after {done} files failed: {e}"),
            }
        }
    }

    fn prune_deleted(&self, deleted: &[String]) -> usize {
        let gone: Vec<PathBuf> = deleted
            .iter()
            .map(|key| self.cache.workspace().join(key))
            .filter(|path| !path.exists())
            .collect();
        if gone.is_empty() {
            return 0;
        }
        let removed = self.cache.invalidate(&gone);
        debug!("dropped cached state for {removed} deleted files");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorError;
    use kestrel_cache::{CacheOptions, ResultStore};
    use serde::Deserialize;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Marker {
        line: usize,
        text: String,
    }

    /// Reports lines containing `TODO` and counts its invocations.
    struct TodoDetector {
        version: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl TodoDetector {
        fn new(version: &'static str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    version,
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl Detector for TodoDetector {
        type Finding = Marker;

        fn name(&self) -> &str {
            "todo"
        }

        fn version(&self) -> &str {
            self.version
        }

        fn analyze(&self, path: &Path) -> Result<Vec<Marker>, DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = std::fs::read_to_string(path).map_err(|source| DetectorError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(text
                .lines()
                .enumerate()
                .filter(|(_, l)| l.contains("TODO"))
                .map(|(i, l)| Marker {
                    line: i + 1,
                    text: l.trim().to_string(),
                })
                .collect())
        }
    }

    /// Fails on any file whose name starts with `bad`.
    struct PickyDetector;

    impl Detector for PickyDetector {
        type Finding = Marker;

        fn name(&self) -> &str {
            "picky"
        }

        fn version(&self) -> &str {
            "1"
        }

        fn analyze(&self, path: &Path) -> Result<Vec<Marker>, DetectorError> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with("bad") {
                return Err(DetectorError::Failed {
                    path: path.to_path_buf(),
                    reason: "refused".to_string(),
                });
            }
            Ok(Vec::new())
        }
    }

    /// Records whether the hash file existed each time it was invoked.
    struct CheckpointWatcher {
        hashes_file: PathBuf,
        seen: Arc<Mutex<Vec<bool>>>,
    }

    impl Detector for CheckpointWatcher {
        type Finding = Marker;

        fn name(&self) -> &str {
            "watcher"
        }

        fn version(&self) -> &str {
            "1"
        }

        fn analyze(&self, _path: &Path) -> Result<Vec<Marker>, DetectorError> {
            self.seen.lock().unwrap().push(self.hashes_file.exists());
            Ok(Vec::new())
        }
    }

    fn workspace(files: &[(&str, &str)]) -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (name, content) in files {
            let path = dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            paths.push(path);
        }
        (dir, paths)
    }

    fn not_cancelled() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn second_run_replays_cached_findings() {
        let (dir, paths) = workspace(&[("a.ts", "let x;\n// TODO fix\n"), ("b.ts", "ok\n")]);

        let first = {
            let cache = IncrementalCache::open(dir.path(), CacheOptions::default());
            let (detector, calls) = TodoDetector::new("1");
            let report = Orchestrator::new(&cache, RunOptions::default())
                .with_detector(detector)
                .run(&paths, &not_cancelled())
                .unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 2);
            assert_eq!(report.summary.changed, 2);
            assert_eq!(report.summary.completed, 2);
            assert!(report.persisted.is_ok());
            report
        };

        let cache = IncrementalCache::open(dir.path(), CacheOptions::default());
        let (detector, calls) = TodoDetector::new("1");
        let second = Orchestrator::new(&cache, RunOptions::default())
            .with_detector(detector)
            .run(&paths, &not_cancelled())
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.summary.unchanged, 2);
        assert_eq!(second.summary.cache_hits, 2);
        assert_eq!(second.summary.detector_runs, 0);
        assert_eq!(
            second.files["a.ts"].findings["todo"],
            first.files["a.ts"].findings["todo"]
        );
        assert_eq!(
            second.files["a.ts"].findings["todo"],
            vec![Marker {
                line: 2,
                text: "// TODO fix".to_string()
            }]
        );
    }

    #[test]
    fn modified_file_is_reanalyzed() {
        let (dir, paths) = workspace(&[("a.ts", "one\n"), ("b.ts", "two\n")]);
        let cache = IncrementalCache::open(dir.path(), CacheOptions::default());
        let (detector, calls) = TodoDetector::new("1");
        let orchestrator = Orchestrator::new(&cache, RunOptions::default()).with_detector(detector);

        orchestrator.run(&paths, &not_cancelled()).unwrap();
        std::fs::write(&paths[0], "one\n// TODO\n").unwrap();
        let report = orchestrator.run(&paths, &not_cancelled()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.summary.changed, 1);
        assert_eq!(report.summary.unchanged, 1);
        assert_eq!(report.files["a.ts"].findings["todo"].len(), 1);
    }

    #[test]
    fn detector_version_bump_reruns_unchanged_files() {
        let (dir, paths) = workspace(&[("a.ts", "x\n"), ("b.ts", "y\n")]);
        let cache = IncrementalCache::open(dir.path(), CacheOptions::default());

        let (v1, _) = TodoDetector::new("1");
        Orchestrator::new(&cache, RunOptions::default())
            .with_detector(v1)
            .run(&paths, &not_cancelled())
            .unwrap();

        let (v2, calls) = TodoDetector::new("2");
        let report = Orchestrator::new(&cache, RunOptions::default())
            .with_detector(v2)
            .run(&paths, &not_cancelled())
            .unwrap();

        assert_eq!(report.summary.unchanged, 2);
        assert_eq!(report.summary.cache_hits, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_detector_leaves_file_uncommitted() {
        let (dir, paths) = workspace(&[("good.ts", "a\n"), ("bad.ts", "b\n")]);
        let cache = IncrementalCache::open(dir.path(), CacheOptions::default());
        let (todo, _) = TodoDetector::new("1");
        let orchestrator = Orchestrator::new(&cache, RunOptions::default())
            .with_detector(todo)
            .with_detector(PickyDetector);

        let report = orchestrator.run(&paths, &not_cancelled()).unwrap();
        assert!(report.files["good.ts"].complete);
        assert!(!report.files["bad.ts"].complete);
        assert!(report.files["bad.ts"].findings.contains_key("todo"));
        assert_eq!(report.summary.detector_failures, 1);
        assert_eq!(report.summary.completed, 1);

        let hashes = cache.file_hashes();
        assert!(hashes.contains_key("good.ts"));
        assert!(!hashes.contains_key("bad.ts"));

        let again = orchestrator.run(&paths, &not_cancelled()).unwrap();
        assert_eq!(again.summary.changed, 1);
        assert_eq!(again.summary.unchanged, 1);
    }

    #[test]
    fn cancelled_run_commits_nothing_but_still_flushes() {
        let (dir, paths) = workspace(&[("a.ts", "x\n")]);
        let cache = IncrementalCache::open(dir.path(), CacheOptions::default());
        let (detector, calls) = TodoDetector::new("1");

        let report = Orchestrator::new(&cache, RunOptions::default())
            .with_detector(detector)
            .run(&paths, &AtomicBool::new(true))
            .unwrap();

        assert!(report.summary.cancelled);
        assert!(report.files.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(cache.file_hashes().is_empty());
        assert!(report.persisted.is_ok());
        assert!(ResultStore::new(cache.cache_dir()).hashes_path().exists());
    }

    #[test]
    fn checkpoints_persist_progress_during_the_run() {
        let (dir, paths) = workspace(&[("a.ts", "x\n"), ("b.ts", "y\n")]);
        let cache = IncrementalCache::open(dir.path(), CacheOptions::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let detector = CheckpointWatcher {
            hashes_file: ResultStore::new(cache.cache_dir()).hashes_path(),
            seen: Arc::clone(&seen),
        };
        let options = RunOptions {
            jobs: 1,
            checkpoint_every: 1,
            ..RunOptions::default()
        };

        Orchestrator::new(&cache, options)
            .with_detector(detector)
            .run(&paths, &not_cancelled())
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    }

    #[test]
    fn deleted_files_are_pruned() {
        let (dir, paths) = workspace(&[("a.ts", "x\n"), ("b.ts", "y\n")]);
        let cache = IncrementalCache::open(dir.path(), CacheOptions::default());
        let (detector, _) = TodoDetector::new("1");
        let orchestrator = Orchestrator::new(&cache, RunOptions::default()).with_detector(detector);

        orchestrator.run(&paths, &not_cancelled()).unwrap();
        std::fs::remove_file(&paths[1]).unwrap();
        let report = orchestrator.run(&paths[..1], &not_cancelled()).unwrap();

        assert_eq!(report.summary.pruned, 1);
        assert_eq!(
            cache.file_hashes().keys().collect::<Vec<_>>(),
            vec!["a.ts"]
        );
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn files_outside_the_candidate_list_are_kept() {
        let (dir, paths) = workspace(&[("a.ts", "x\n"), ("b.ts", "y\n")]);
        let cache = IncrementalCache::open(dir.path(), CacheOptions::default());
        let (detector, _) = TodoDetector::new("1");
        let orchestrator = Orchestrator::new(&cache, RunOptions::default()).with_detector(detector);

        orchestrator.run(&paths, &not_cancelled()).unwrap();
        let report = orchestrator.run(&paths[..1], &not_cancelled()).unwrap();

        assert_eq!(report.summary.pruned, 0);
        assert_eq!(cache.file_hashes().len(), 2);
    }

    #[test]
    fn options_from_config() {
        let config = AnalysisConfig {
            jobs: 3,
            checkpoint_every: 50,
            ..AnalysisConfig::default()
        };
        let options = RunOptions::from_config(&config);
        assert_eq!(options.jobs, 3);
        assert_eq!(options.checkpoint_every, 50);
        assert!(options.prune_deleted);
    }
}
