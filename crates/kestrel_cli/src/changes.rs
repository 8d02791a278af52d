//! `kestrel changes`: report which files need analysis.
//!
//! Runs change detection against the persisted hashes without committing
//! anything, so the cache is left exactly as it was.

use std::fmt::Write as _;

use kestrel_cache::ChangeSet;
use kestrel_engine::open_cache;

use crate::pipeline::{load_workspace, missing_files, resolve_candidates};
use crate::{ChangesArgs, GlobalArgs, ReportFormat};

/// Runs the `kestrel changes` command. Always exits 0 on success.
pub fn run(args: &ChangesArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let workspace = load_workspace(global)?;
    let cache = open_cache(&workspace.root, &workspace.config);
    let candidates = resolve_candidates(&workspace, cache.cache_dir(), &args.paths)?;

    let changes = cache.detect_changes(&candidates);
    let deleted: Vec<&String> = missing_files(&workspace.root, &changes.deleted);

    match args.format {
        ReportFormat::Text => {
            print!("{}", render_text(&changes, &deleted, args.all));
            if !global.quiet {
                eprintln!(
                    "{} changed, {} unchanged, {} deleted",
                    changes.changed.len(),
                    changes.unchanged.len(),
                    deleted.len()
                );
            }
        }
        ReportFormat::Json => {
            let report = serde_json::json!({
                "changed": changes.changed,
                "unchanged": changes.unchanged,
                "deleted": deleted,
                "vcs_skipped": changes.vcs_skipped,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(0)
}

/// One line per file: `M` changed, `D` deleted, `=` unchanged (with `all`).
fn render_text(changes: &ChangeSet, deleted: &[&String], all: bool) -> String {
    let mut out = String::new();
    for key in &changes.changed {
        let _ = writeln!(out, "M {key}");
    }
    for key in deleted {
        let _ = writeln!(out, "D {key}");
    }
    if all {
        for key in &changes.unchanged {
            let _ = writeln!(out, "= {key}");
        }
    }
    out
}
