//! Run report generation and YAML serialization.
//!
//! Captures environment, load totals, resource usage, and per-file verdicts
//! for every run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use sysinfo::System;

use crate::metrics::Metrics;
use crate::pipeline::processor::FileStats;
use crate::runs::RunContext;
use crate::sampler::ResourceSampler;

/// Status of a load run.
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "status")]
pub enum RunStatus {
    Success,
    Error { message: String },
}

/// Complete report for a single load run.
#[derive(Serialize, Clone, Debug)]
pub struct RunReport {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub duration_secs: f64,
    #[serde(flatten)]
    pub status: RunStatus,

    pub environment: EnvironmentInfo,
    pub performance: PerformanceMetrics,
    pub resources: ResourceMetrics,
    pub bottleneck: BottleneckInfo,
    /// Per-file totals and gate verdicts, in rename order.
    pub files: Vec<FileStats>,
}

/// Environment information about the system.
#[derive(Serialize, Clone, Debug)]
pub struct EnvironmentInfo {
    pub os: String,
    pub os_version: String,
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub total_memory_gb: f64,
}

/// Load totals from the run.
#[derive(Serialize, Clone, Debug)]
pub struct PerformanceMetrics {
    pub files_loaded: u64,
    pub files_failed: u64,
    pub lines_read: u64,
    pub records_processed: u64,
    pub record_errors: u64,
    pub records_per_sec: f64,
    pub batches_sent: u64,
    pub set_retries: u64,
    pub bytes_read: u64,
    pub bytes_per_sec: f64,
}

/// Resource usage metrics.
#[derive(Serialize, Clone, Debug)]
pub struct ResourceMetrics {
    pub peak_rss_mb: f64,
    pub peak_cpu_percent: f32,
    pub avg_queue_fullness_percent: f32,
}

/// Bottleneck diagnosis information.
#[derive(Serialize, Clone, Debug)]
pub struct BottleneckInfo {
    pub diagnosis: String,
    pub confidence: f32,
    pub recommendations: Vec<String>,
}

impl EnvironmentInfo {
    /// Gather environment information from the system.
    pub fn gather() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let os = System::name().unwrap_or_else(|| "Unknown".to_string());
        let os_version = System::os_version().unwrap_or_else(|| "Unknown".to_string());

        let cpu_model = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let cpu_cores = sys.cpus().len();
        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);

        Self {
            os,
            os_version,
            cpu_model,
            cpu_cores,
            total_memory_gb,
        }
    }
}

impl RunReport {
    /// Generate a complete run report.
    pub fn generate(
        run_context: &RunContext,
        metrics: &Metrics,
        sampler: &ResourceSampler,
        status: RunStatus,
        files: Vec<FileStats>,
    ) -> Self {
        let elapsed = metrics.elapsed_secs();
        let records = metrics.records_processed();
        let bytes_read = metrics.bytes_read();

        let records_per_sec = if elapsed > 0.0 {
            records as f64 / elapsed
        } else {
            0.0
        };

        let bytes_per_sec = if elapsed > 0.0 {
            bytes_read as f64 / elapsed
        } else {
            0.0
        };

        let high_water_marks = sampler.get_high_water_marks();
        let bottleneck_diagnosis = sampler.diagnose_bottleneck();

        Self {
            run_id: run_context.run_id.clone(),
            timestamp: run_context.start_time,
            duration_secs: elapsed,
            status,
            environment: EnvironmentInfo::gather(),
            performance: PerformanceMetrics {
                files_loaded: metrics.files_loaded(),
                files_failed: metrics.files_failed(),
                lines_read: metrics.lines_read(),
                records_processed: records,
                record_errors: metrics.record_errors(),
                records_per_sec,
                batches_sent: metrics.batches_sent(),
                set_retries: metrics.set_retries(),
                bytes_read,
                bytes_per_sec,
            },
            resources: ResourceMetrics {
                peak_rss_mb: high_water_marks.peak_rss_bytes as f64 / (1024.0 * 1024.0),
                peak_cpu_percent: high_water_marks.peak_cpu_percent,
                avg_queue_fullness_percent: high_water_marks.avg_queue_fullness * 100.0,
            },
            bottleneck: BottleneckInfo {
                diagnosis: bottleneck_diagnosis.diagnosis,
                confidence: bottleneck_diagnosis.confidence,
                recommendations: bottleneck_diagnosis.recommendations,
            },
            files,
        }
    }

    /// Save the report as YAML to the specified path.
    pub fn save_yaml(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize report to YAML")?;

        fs::write(path, yaml)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;

        Ok(())
    }
}
