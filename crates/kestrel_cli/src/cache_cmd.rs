//! `kestrel cache`: statistics and maintenance of the persisted cache.

use std::fmt::Write as _;
use std::path::PathBuf;

use kestrel_cache::{CacheStats, IncrementalCache};
use kestrel_engine::open_cache;

use crate::pipeline::{load_workspace, missing_files, Workspace};
use crate::{GlobalArgs, ReportFormat};

/// Runs `kestrel cache stats`.
pub fn stats(format: ReportFormat, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let workspace = load_workspace(global)?;
    let cache = open_cache(&workspace.root, &workspace.config);
    let stats = cache.stats();

    match format {
        ReportFormat::Text => print!("{}", render_stats(&cache, &stats)),
        ReportFormat::Json => {
            let report = serde_json::json!({
                "dir": cache.cache_dir().display().to_string(),
                "files": stats.files,
                "entries": stats.entries,
                "per_detector": stats.per_detector,
                "last_updated": stats.last_updated.map(|t| t.to_rfc3339()),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(0)
}

fn render_stats(cache: &IncrementalCache, stats: &CacheStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "cache dir:     {}", cache.cache_dir().display());
    let _ = writeln!(out, "files:         {}", stats.files);
    let _ = writeln!(out, "entries:       {}", stats.entries);
    for (detector, count) in &stats.per_detector {
        let _ = writeln!(out, "  {detector}: {count}");
    }
    match stats.last_updated {
        Some(t) => {
            let _ = writeln!(out, "last updated:  {}", t.to_rfc3339());
        }
        None => {
            let _ = writeln!(out, "last updated:  never");
        }
    }
    out
}

/// Runs `kestrel cache prune`.
pub fn prune(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let workspace = load_workspace(global)?;
    let (deleted, expired) = prune_workspace(&workspace)?;
    if !global.quiet {
        eprintln!("removed {deleted} deleted files and {expired} expired entries");
    }
    Ok(0)
}

/// Drops state for files missing from disk and expired entries, then saves.
fn prune_workspace(workspace: &Workspace) -> Result<(usize, usize), Box<dyn std::error::Error>> {
    let cache = open_cache(&workspace.root, &workspace.config);
    let hashes = cache.file_hashes();
    let gone: Vec<PathBuf> = missing_files(&workspace.root, hashes.keys())
        .into_iter()
        .map(|key| workspace.root.join(key))
        .collect();

    let deleted = cache.invalidate(&gone);
    let expired = cache.prune_expired();
    cache.save()?;
    Ok((deleted, expired))
}

/// Runs `kestrel cache clean`.
pub fn clean(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let workspace = load_workspace(global)?;
    let cache = open_cache(&workspace.root, &workspace.config);
    cache.reset();
    cache.flush()?;
    if !global.quiet {
        eprintln!("cleared cache in {}", cache.cache_dir().display());
    }
    Ok(0)
}
