pub mod processor;
pub mod reader;
pub mod router;
pub mod writer;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::memc::RetryPolicy;
use crate::metrics::Metrics;
use crate::pipeline::router::ShardMap;
use crate::sampler::QueueStats;

/// Everything a file processor needs, passed explicitly instead of living
/// in process-wide globals.
#[derive(Clone)]
pub struct LoadContext {
    pub shards: ShardMap,
    pub dry_run: bool,
    pub chunk_size: usize,
    pub queue_capacity: usize,
    pub buffer_size: usize,
    pub socket_timeout: Duration,
    pub retry: RetryPolicy,
    pub normal_err_rate: f64,
    pub metrics: Metrics,
    pub queue_stats: Arc<QueueStats>,
}

impl LoadContext {
    pub fn from_settings(settings: &Settings, dry_run: bool, metrics: Metrics) -> Self {
        Self {
            shards: ShardMap::new(
                &settings.ingest.idfa,
                &settings.ingest.gaid,
                &settings.ingest.adid,
                &settings.ingest.dvid,
            ),
            dry_run,
            chunk_size: settings.performance.chunk_size,
            queue_capacity: settings.performance.queue_capacity,
            buffer_size: settings.performance.buffer_size,
            socket_timeout: settings.socket_timeout(),
            retry: settings.retry_policy(),
            normal_err_rate: settings.ingest.normal_err_rate,
            metrics,
            queue_stats: Arc::new(QueueStats::new(settings.performance.queue_capacity)),
        }
    }
}
