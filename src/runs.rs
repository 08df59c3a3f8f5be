//! Run directory lifecycle management.
//!
//! Creates timestamped run directories and manages cleanup of old runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Context for a single load run, including directory paths and timing.
pub struct RunContext {
    /// Path to the run directory (e.g., `runs/run_20260801_143022/`)
    pub run_dir: PathBuf,
    /// Unique run identifier (e.g., `run_20260801_143022`)
    pub run_id: String,
    /// UTC timestamp when the run started
    pub start_time: DateTime<Utc>,
}

impl RunContext {
    /// Create a new run context with a timestamped directory.
    ///
    /// Creates the directory structure: `{runs_dir}/run_{YYYYMMDD_HHMMSS}/`
    pub fn new(runs_dir: &Path) -> Result<Self> {
        Self::with_run_id(runs_dir, None)
    }

    /// Like [`RunContext::new`], but with an optional caller-chosen run id.
    ///
    /// Ids not starting with `run_` get the prefix added, so cleanup keeps
    /// recognizing the directory.
    pub fn with_run_id(runs_dir: &Path, run_id: Option<String>) -> Result<Self> {
        let start_time = Utc::now();
        let run_id = match run_id {
            Some(id) if id.starts_with("run_") => id,
            Some(id) => format!("run_{id}"),
            None => format!("run_{}", start_time.format("%Y%m%d_%H%M%S")),
        };
        let run_dir = runs_dir.join(&run_id);

        fs::create_dir_all(&run_dir)
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        Ok(Self {
            run_dir,
            run_id,
            start_time,
        })
    }

    /// Path to the report.yaml file within this run directory.
    pub fn report_path(&self) -> PathBuf {
        self.run_dir.join("report.yaml")
    }

    /// Path to the load.log file within this run directory.
    pub fn log_path(&self) -> PathBuf {
        self.run_dir.join("load.log")
    }

    /// Path to the config_snapshot.yaml file within this run directory.
    pub fn config_snapshot_path(&self) -> PathBuf {
        self.run_dir.join("config_snapshot.yaml")
    }
}

/// Clean up old run directories, keeping only the most recent `keep_count`.
///
/// Runs are sorted by directory name (which includes timestamp) and older
/// runs beyond `keep_count` are removed.
pub fn cleanup_old_runs(runs_dir: &Path, keep_count: usize) -> Result<()> {
    if !runs_dir.exists() {
        return Ok(());
    }

    let mut run_dirs: Vec<PathBuf> = fs::read_dir(runs_dir)
        .with_context(|| format!("Failed to read runs directory: {}", runs_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("run_"))
                    .unwrap_or(false)
        })
        .collect();

    run_dirs.sort();

    if run_dirs.len() > keep_count {
        let to_remove = run_dirs.len() - keep_count;
        for dir in run_dirs.into_iter().take(to_remove) {
            if let Err(e) = fs::remove_dir_all(&dir) {
                // Log but don't fail on cleanup errors
                eprintln!(
                    "[WARN] Failed to remove old run directory {}: {}",
                    dir.display(),
                    e
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn run_context_creation() {
        let temp_dir = tempfile::tempdir().unwrap();

        let ctx = RunContext::new(temp_dir.path()).unwrap();

        assert!(ctx.run_dir.exists());
        assert!(ctx.run_id.starts_with("run_"));
        assert!(ctx.report_path().ends_with("report.yaml"));
        assert!(ctx.log_path().ends_with("load.log"));
        assert!(ctx.config_snapshot_path().ends_with("config_snapshot.yaml"));
    }

    #[test]
    fn explicit_run_id_gains_the_prefix() {
        let temp_dir = tempfile::tempdir().unwrap();

        let ctx = RunContext::with_run_id(temp_dir.path(), Some("bench".to_string())).unwrap();
        assert_eq!(ctx.run_id, "run_bench");

        let ctx = RunContext::with_run_id(temp_dir.path(), Some("run_x".to_string())).unwrap();
        assert_eq!(ctx.run_id, "run_x");
    }

    #[test]
    fn cleanup_keeps_the_newest_runs() {
        let temp_dir = tempfile::tempdir().unwrap();

        for i in 1..=5 {
            let run_dir = temp_dir.path().join(format!("run_2026010{}_120000", i));
            fs::create_dir_all(&run_dir).unwrap();
            File::create(run_dir.join("report.yaml")).unwrap();
        }

        cleanup_old_runs(temp_dir.path(), 2).unwrap();

        let mut remaining: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();

        assert_eq!(remaining, vec!["run_20260104_120000", "run_20260105_120000"]);
    }
}
