use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide load counters, cheap to clone and update from any thread.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    start_time: Instant,
    files_loaded: AtomicU64,
    files_failed: AtomicU64,
    lines_read: AtomicU64,
    records_processed: AtomicU64,
    record_errors: AtomicU64,
    batches_sent: AtomicU64,
    bytes_read: AtomicU64,
    set_retries: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                start_time: Instant::now(),
                files_loaded: AtomicU64::new(0),
                files_failed: AtomicU64::new(0),
                lines_read: AtomicU64::new(0),
                records_processed: AtomicU64::new(0),
                record_errors: AtomicU64::new(0),
                batches_sent: AtomicU64::new(0),
                bytes_read: AtomicU64::new(0),
                set_retries: AtomicU64::new(0),
            }),
        }
    }

    pub fn inc_files_loaded(&self) {
        self.inner.files_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_files_failed(&self) {
        self.inner.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_lines(&self, count: u64) {
        self.inner.lines_read.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_processed(&self, count: u64) {
        self.inner
            .records_processed
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_errors(&self, count: u64) {
        self.inner.record_errors.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_batches(&self) {
        self.inner.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, bytes: u64) {
        self.inner.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_retries(&self, count: u64) {
        self.inner.set_retries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn files_loaded(&self) -> u64 {
        self.inner.files_loaded.load(Ordering::Relaxed)
    }

    pub fn files_failed(&self) -> u64 {
        self.inner.files_failed.load(Ordering::Relaxed)
    }

    pub fn lines_read(&self) -> u64 {
        self.inner.lines_read.load(Ordering::Relaxed)
    }

    pub fn records_processed(&self) -> u64 {
        self.inner.records_processed.load(Ordering::Relaxed)
    }

    pub fn record_errors(&self) -> u64 {
        self.inner.record_errors.load(Ordering::Relaxed)
    }

    pub fn batches_sent(&self) -> u64 {
        self.inner.batches_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.inner.bytes_read.load(Ordering::Relaxed)
    }

    pub fn set_retries(&self) -> u64 {
        self.inner.set_retries.load(Ordering::Relaxed)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.inner.start_time.elapsed().as_secs_f64()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
