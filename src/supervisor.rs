//! Discovers input files and drives a bounded pool of file processors,
//! consuming completions in submission order so dot-renames land in
//! filename order no matter which file finishes first.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crossbeam_channel::unbounded;
use glob::{glob_with, MatchOptions};

use crate::error::{LoadError, Result};
use crate::pipeline::processor::{process_log, FileStats};
use crate::pipeline::LoadContext;

/// Outcome of a whole run over one glob pattern.
#[derive(Debug, Default)]
pub struct LoadSummary {
    /// Per-file totals for every file that drained.
    pub files: Vec<FileStats>,
    /// Files that could not be processed or renamed.
    pub failed_files: u64,
    /// Files marked completed.
    pub renamed: u64,
}

/// Resolves the input pattern to a sorted file list.
///
/// Leading dots are literal in the match, so completed files are never
/// rediscovered after a restart.
pub fn discover_logs(pattern: &str) -> Result<Vec<PathBuf>> {
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };
    let mut files = Vec::new();
    for entry in glob_with(pattern, options)? {
        match entry {
            Ok(path) => files.push(path),
            Err(e) => eprintln!("[WARN] Unreadable glob entry: {e}"),
        }
    }
    files.sort();
    Ok(files)
}

/// Marks a file completed: atomic same-directory rename to a dot-prefixed name.
pub fn dot_rename(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| LoadError::BadPath(path.to_path_buf()))?;
    let target = path.with_file_name(format!(".{}", name.to_string_lossy()));
    fs::rename(path, &target)?;
    Ok(target)
}

/// Runs the full load over everything the pattern matches.
///
/// A file whose processor fails is logged and left un-renamed so a restart
/// picks it up again; it never aborts the pool.
pub fn run(pattern: &str, workers: usize, ctx: &LoadContext) -> Result<LoadSummary> {
    let files = discover_logs(pattern)?;
    if files.is_empty() {
        eprintln!("[WARN] No input files match {pattern}");
        return Ok(LoadSummary::default());
    }
    eprintln!("[INFO] Found {} file(s) to load", files.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("loader-{i}"))
        .build()?;

    let (done_tx, done_rx) = unbounded();
    for (idx, path) in files.into_iter().enumerate() {
        let done_tx = done_tx.clone();
        let ctx = ctx.clone();
        pool.spawn(move || {
            let outcome = process_log(&path, &ctx);
            let _ = done_tx.send((idx, path, outcome));
        });
    }
    drop(done_tx);

    let mut summary = LoadSummary::default();
    let mut pending = BTreeMap::new();
    let mut next = 0usize;
    for (idx, path, outcome) in done_rx.iter() {
        pending.insert(idx, (path, outcome));
        while let Some((path, outcome)) = pending.remove(&next) {
            finish_file(path, outcome, ctx, &mut summary);
            next += 1;
        }
    }
    debug_assert!(pending.is_empty());

    Ok(summary)
}

fn finish_file(
    path: PathBuf,
    outcome: Result<FileStats>,
    ctx: &LoadContext,
    summary: &mut LoadSummary,
) {
    match outcome {
        Ok(stats) => {
            match dot_rename(&path) {
                Ok(renamed) => {
                    eprintln!("[INFO] Renamed {} -> {}", path.display(), renamed.display());
                    summary.renamed += 1;
                    ctx.metrics.inc_files_loaded();
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to rename {}: {e}", path.display());
                    summary.failed_files += 1;
                    ctx.metrics.inc_files_failed();
                }
            }
            summary.files.push(stats);
        }
        Err(e) => {
            eprintln!("[ERROR] Failed to process {}: {e}", path.display());
            summary.failed_files += 1;
            ctx.metrics.inc_files_failed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn discovery_is_sorted_and_skips_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.tsv.gz", "a.tsv.gz", ".done.tsv.gz", "notes.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let pattern = dir.path().join("*.tsv.gz");
        let files = discover_logs(pattern.to_str().unwrap()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.tsv.gz", "b.tsv.gz"]);
    }

    #[test]
    fn dot_rename_prefixes_the_basename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t1.tsv.gz");
        File::create(&path).unwrap();

        let renamed = dot_rename(&path).unwrap();
        assert_eq!(renamed, dir.path().join(".t1.tsv.gz"));
        assert!(!path.exists());
        assert!(renamed.exists());

        // The original name is gone; a second rename must fail.
        assert!(dot_rename(&path).is_err());
    }
}
