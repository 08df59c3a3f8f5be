use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::memc::RetryPolicy;

/// Root configuration structure with versioning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Configuration schema version for compatibility tracking
    pub version: String,
    /// Input discovery and shard endpoints
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Performance tuning parameters
    #[serde(default)]
    pub performance: PerformanceConfig,
    /// Socket and retry behavior
    #[serde(default)]
    pub network: NetworkConfig,
    /// Run ledger directories
    #[serde(default)]
    pub runs: RunsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Input discovery and shard routing section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Glob pattern for input files; completed files are dot-prefixed and
    /// never rediscovered
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// idfa shard endpoint (host:port)
    #[serde(default = "default_idfa")]
    pub idfa: String,
    /// gaid shard endpoint (host:port)
    #[serde(default = "default_gaid")]
    pub gaid: String,
    /// adid shard endpoint (host:port)
    #[serde(default = "default_adid")]
    pub adid: String,
    /// dvid shard endpoint (host:port)
    #[serde(default = "default_dvid")]
    pub dvid: String,
    /// Per-file acceptance threshold on errors/processed
    #[serde(default = "default_normal_err_rate")]
    pub normal_err_rate: f64,
}

/// Performance tuning configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Number of concurrent file processors
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Lines per chunk handed to the router
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Batches in flight per shard queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Buffer size for reading input files (bytes)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

/// Socket and retry configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Connect/read/write timeout on shard connections (milliseconds)
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,
    /// Total bulk-set attempts, the first submission included
    #[serde(default = "default_retry_tries")]
    pub retry_tries: u32,
    /// Sleep before the second attempt (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Multiplier applied to the sleep after each round
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: f64,
}

/// Run ledger configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunsConfig {
    /// Directory holding per-run artifacts (log, report, config snapshot)
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
    /// How many past runs to keep on disk
    #[serde(default = "default_keep_runs")]
    pub keep_runs: usize,
}

/// Logging configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_pattern() -> String {
    "/data/appsinstalled/*.tsv.gz".to_string()
}

fn default_idfa() -> String {
    "127.0.0.1:33013".to_string()
}

fn default_gaid() -> String {
    "127.0.0.1:33014".to_string()
}

fn default_adid() -> String {
    "127.0.0.1:33015".to_string()
}

fn default_dvid() -> String {
    "127.0.0.1:33016".to_string()
}

fn default_normal_err_rate() -> f64 {
    0.01
}

fn default_workers() -> usize {
    2
}

fn default_chunk_size() -> usize {
    100
}

fn default_queue_capacity() -> usize {
    16
}

fn default_buffer_size() -> usize {
    256 * 1024 // 256KB
}

fn default_socket_timeout_ms() -> u64 {
    2_000
}

fn default_retry_tries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_retry_backoff() -> f64 {
    2.0
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("runs")
}

fn default_keep_runs() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from a YAML file. Falls back to defaults if file is missing.
    /// Fails fast with clear error message if YAML parsing fails.
    pub fn load_from_yaml(config_path: Option<&Path>) -> Result<Self> {
        let path = if let Some(p) = config_path {
            p.to_path_buf()
        } else {
            PathBuf::from("config.yaml")
        };

        let config_str = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "[INFO] Config file not found at {:?}, using hardcoded defaults",
                    path
                );
                return Ok(Self::default());
            }
            Err(e) => return Err(e).context(format!("Failed to read config file at {:?}", path)),
        };

        let settings: Settings = serde_yaml::from_str(&config_str).context(format!(
            "Failed to parse config at {:?}: invalid YAML structure",
            path
        ))?;

        if settings.version != "1.0" {
            eprintln!(
                "[WARN] Config version mismatch: expected 1.0, got {}. Continuing with current schema.",
                settings.version
            );
        }

        eprintln!(
            "[INFO] Loaded config from {:?} (version: {})",
            path, settings.version
        );
        Ok(settings)
    }

    /// Merge CLI arguments into settings, with CLI taking precedence
    pub fn merge_with_cli(
        mut self,
        cli_pattern: Option<String>,
        cli_idfa: Option<String>,
        cli_gaid: Option<String>,
        cli_adid: Option<String>,
        cli_dvid: Option<String>,
        cli_workers: Option<usize>,
    ) -> Self {
        if let Some(pattern) = cli_pattern {
            self.ingest.pattern = pattern;
            eprintln!("[INFO] CLI override: pattern");
        }
        if let Some(idfa) = cli_idfa {
            self.ingest.idfa = idfa;
            eprintln!("[INFO] CLI override: idfa");
        }
        if let Some(gaid) = cli_gaid {
            self.ingest.gaid = gaid;
            eprintln!("[INFO] CLI override: gaid");
        }
        if let Some(adid) = cli_adid {
            self.ingest.adid = adid;
            eprintln!("[INFO] CLI override: adid");
        }
        if let Some(dvid) = cli_dvid {
            self.ingest.dvid = dvid;
            eprintln!("[INFO] CLI override: dvid");
        }
        if let Some(workers) = cli_workers {
            self.performance.workers = workers;
            eprintln!("[INFO] CLI override: workers");
        }
        self
    }

    /// Save the effective configuration alongside the run's other artifacts.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config snapshot")?;
        fs::write(path, yaml)
            .with_context(|| format!("Failed to write config snapshot to {}", path.display()))?;
        Ok(())
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.network.socket_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            tries: self.network.retry_tries,
            delay: Duration::from_millis(self.network.retry_delay_ms),
            backoff: self.network.retry_backoff,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            ingest: IngestConfig::default(),
            performance: PerformanceConfig::default(),
            network: NetworkConfig::default(),
            runs: RunsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            idfa: default_idfa(),
            gaid: default_gaid(),
            adid: default_adid(),
            dvid: default_dvid(),
            normal_err_rate: default_normal_err_rate(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            chunk_size: default_chunk_size(),
            queue_capacity: default_queue_capacity(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            socket_timeout_ms: default_socket_timeout_ms(),
            retry_tries: default_retry_tries(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            runs_dir: default_runs_dir(),
            keep_runs: default_keep_runs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}
