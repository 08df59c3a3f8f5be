//! Background resource sampling for load diagnostics.
//!
//! Samples CPU usage, RSS memory, and shard-queue fullness at 1Hz intervals
//! to identify pipeline bottlenecks without impacting the hot path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

/// Fullness samples from the shard queues, for backpressure tracking.
pub struct QueueStats {
    capacity: usize,
    samples: Mutex<Vec<f32>>,
}

impl QueueStats {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: Mutex::new(Vec::with_capacity(1024)),
        }
    }

    /// Record the current queue length as a fullness sample.
    pub fn record_fullness(&self, current_len: usize) {
        let fullness = if self.capacity > 0 {
            current_len as f32 / self.capacity as f32
        } else {
            0.0
        };
        if let Ok(mut samples) = self.samples.lock() {
            samples.push(fullness);
        }
    }

    /// Average fullness across all samples (0.0 - 1.0).
    pub fn average_fullness(&self) -> f32 {
        if let Ok(samples) = self.samples.lock() {
            if samples.is_empty() {
                return 0.0;
            }
            samples.iter().sum::<f32>() / samples.len() as f32
        } else {
            0.0
        }
    }
}

/// A single resource sample taken at a point in time.
#[derive(Clone, Debug)]
pub struct ResourceSample {
    /// Time since sampler started
    pub elapsed: Duration,
    /// CPU usage percentage (0.0 - 100.0)
    pub cpu_percent: f32,
    /// Resident Set Size (physical RAM) in bytes
    pub rss_bytes: u64,
    /// Queue fullness at this sample (0.0 - 1.0)
    pub queue_fullness: f32,
}

/// High-water marks from resource sampling.
#[derive(Clone, Debug, Default)]
pub struct ResourceHighWaterMarks {
    /// Peak RSS in bytes
    pub peak_rss_bytes: u64,
    /// Peak CPU percentage
    pub peak_cpu_percent: f32,
    /// Average queue fullness (0.0 - 1.0)
    pub avg_queue_fullness: f32,
}

/// Bottleneck diagnosis result.
#[derive(Clone, Debug)]
pub struct BottleneckDiagnosis {
    /// Diagnosis string: "Network Bottleneck", "Reader Bottleneck", or "Balanced"
    pub diagnosis: String,
    /// Confidence level (0.0 - 1.0)
    pub confidence: f32,
    /// Recommendations for improving throughput
    pub recommendations: Vec<String>,
}

/// Background resource sampler that collects system metrics at 1Hz.
pub struct ResourceSampler {
    samples: Arc<Mutex<Vec<ResourceSample>>>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    queue_stats: Arc<QueueStats>,
}

impl ResourceSampler {
    /// Start the resource sampler in a background thread.
    ///
    /// Samples CPU, RSS, and queue fullness every 1 second.
    pub fn start(queue_stats: Arc<QueueStats>) -> Self {
        let samples = Arc::new(Mutex::new(Vec::with_capacity(1024)));
        let stop_flag = Arc::new(AtomicBool::new(false));

        let samples_clone = Arc::clone(&samples);
        let stop_clone = Arc::clone(&stop_flag);
        let queue_stats_clone = Arc::clone(&queue_stats);

        let handle = thread::spawn(move || {
            Self::sampling_loop(samples_clone, stop_clone, queue_stats_clone);
        });

        Self {
            samples,
            stop_flag,
            handle: Some(handle),
            queue_stats,
        }
    }

    fn sampling_loop(
        samples: Arc<Mutex<Vec<ResourceSample>>>,
        stop_flag: Arc<AtomicBool>,
        queue_stats: Arc<QueueStats>,
    ) {
        let pid = Pid::from_u32(std::process::id());
        let refresh_kind =
            RefreshKind::new().with_processes(ProcessRefreshKind::new().with_cpu().with_memory());

        let mut sys = System::new_with_specifics(refresh_kind);
        let start = Instant::now();

        sys.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_cpu().with_memory(),
        );

        while !stop_flag.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_secs(1));

            if stop_flag.load(Ordering::Relaxed) {
                break;
            }

            sys.refresh_processes_specifics(
                sysinfo::ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::new().with_cpu().with_memory(),
            );

            if let Some(process) = sys.process(pid) {
                let sample = ResourceSample {
                    elapsed: start.elapsed(),
                    cpu_percent: process.cpu_usage(),
                    rss_bytes: process.memory(),
                    queue_fullness: queue_stats.average_fullness(),
                };

                if let Ok(mut samples_guard) = samples.lock() {
                    samples_guard.push(sample);
                }
            }
        }
    }

    /// Stop the sampler and wait for the background thread to finish.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Get high-water marks from all collected samples.
    pub fn get_high_water_marks(&self) -> ResourceHighWaterMarks {
        let samples = match self.samples.lock() {
            Ok(s) => s,
            Err(_) => return ResourceHighWaterMarks::default(),
        };

        if samples.is_empty() {
            return ResourceHighWaterMarks::default();
        }

        let peak_rss_bytes = samples.iter().map(|s| s.rss_bytes).max().unwrap_or(0);
        let peak_cpu_percent = samples
            .iter()
            .map(|s| s.cpu_percent)
            .fold(0.0f32, |a, b| a.max(b));
        let avg_queue_fullness = self.queue_stats.average_fullness();

        ResourceHighWaterMarks {
            peak_rss_bytes,
            peak_cpu_percent,
            avg_queue_fullness,
        }
    }

    /// Diagnose pipeline bottlenecks based on queue fullness.
    ///
    /// Heuristics:
    /// - Queues >90% full → Network Bottleneck (router outpaces the writers)
    /// - Queues <10% full → Reader Bottleneck (writers outpace decompression/parsing)
    /// - Otherwise → Balanced
    pub fn diagnose_bottleneck(&self) -> BottleneckDiagnosis {
        let avg_fullness = self.queue_stats.average_fullness();

        let (diagnosis, confidence, recommendations) = if avg_fullness > 0.9 {
            (
                "Network Bottleneck".to_string(),
                0.9,
                vec![
                    "Shard writers are the limiting factor".to_string(),
                    "Check memcached endpoint latency and health".to_string(),
                    "Consider increasing queue_capacity to absorb bursts".to_string(),
                ],
            )
        } else if avg_fullness < 0.1 {
            (
                "Reader Bottleneck".to_string(),
                0.9,
                vec![
                    "Gzip decompression and parsing are the limiting factor".to_string(),
                    "Consider increasing buffer_size for better read performance".to_string(),
                    "Consider raising workers to load more files at once".to_string(),
                ],
            )
        } else if avg_fullness > 0.7 {
            (
                "Slight Network Bottleneck".to_string(),
                0.6,
                vec![
                    "Writers are slightly slower than the router".to_string(),
                    "Consider raising chunk_size to amortize round trips".to_string(),
                ],
            )
        } else if avg_fullness < 0.3 {
            (
                "Slight Reader Bottleneck".to_string(),
                0.6,
                vec![
                    "The router is slightly slower than the writers".to_string(),
                    "Consider increasing buffer_size".to_string(),
                ],
            )
        } else {
            (
                "Balanced".to_string(),
                0.8,
                vec!["Pipeline is well-balanced for current configuration".to_string()],
            )
        };

        BottleneckDiagnosis {
            diagnosis,
            confidence,
            recommendations,
        }
    }
}

impl Drop for ResourceSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
