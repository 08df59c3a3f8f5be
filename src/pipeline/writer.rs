//! Per-shard writer worker: one queue, one connection, one set of counters.

use crossbeam_channel::{Receiver, Sender};

use crate::memc::{self, MemcClient};
use crate::pipeline::router::KeyedPayload;
use crate::pipeline::LoadContext;
use crate::record::DeviceType;

/// Message on a shard queue.
pub enum ShardMessage {
    Batch(Vec<KeyedPayload>),
    /// Drain-and-exit sentinel.
    Done,
}

/// Final accounting a shard writer publishes exactly once on shutdown.
#[derive(Debug, Clone, Copy)]
pub struct WorkerStats {
    pub shard: DeviceType,
    pub processed: u64,
    pub errors: u64,
}

/// Worker loop. Every pair accepted from the queue ends up in exactly one
/// of `processed` or `errors`; batches are never dropped silently.
///
/// A disconnected queue counts as a sentinel: the producer is gone either
/// way, and the counters still have to reach the stats channel.
pub fn run_shard_writer(
    shard: DeviceType,
    rx: Receiver<ShardMessage>,
    stats_tx: Sender<WorkerStats>,
    ctx: &LoadContext,
) {
    let addr = ctx.shards.addr(shard).to_string();
    let mut client = MemcClient::new(addr.clone(), ctx.socket_timeout);
    let mut processed: u64 = 0;
    let mut errors: u64 = 0;

    loop {
        match rx.recv() {
            Ok(ShardMessage::Batch(batch)) => {
                if ctx.dry_run {
                    for (key, payload) in &batch {
                        eprintln!("[DEBUG] {addr} - {key} -> {} bytes", payload.len());
                    }
                    processed += batch.len() as u64;
                    ctx.metrics.add_processed(batch.len() as u64);
                    continue;
                }

                match memc::set_multi_retrying(&mut client, &batch, &ctx.retry) {
                    Ok(outcome) => {
                        let ok = batch.len() as u64 - outcome.failed;
                        processed += ok;
                        errors += outcome.failed;
                        ctx.metrics.add_processed(ok);
                        ctx.metrics.add_errors(outcome.failed);
                        ctx.metrics
                            .add_retries(u64::from(outcome.attempts.saturating_sub(1)));
                        if outcome.failed > 0 {
                            eprintln!(
                                "[ERROR] {addr}: {} key(s) unacknowledged after {} attempts",
                                outcome.failed, outcome.attempts
                            );
                        }
                    }
                    Err(e) => {
                        eprintln!("[ERROR] Cannot write to memc {addr}: {e}");
                        errors += batch.len() as u64;
                        ctx.metrics.add_errors(batch.len() as u64);
                    }
                }
            }
            Ok(ShardMessage::Done) | Err(_) => break,
        }
    }

    client.close();
    eprintln!("[INFO] {shard} writer | processed: {processed} | errors: {errors}");
    let _ = stats_tx.send(WorkerStats {
        shard,
        processed,
        errors,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memc::RetryPolicy;
    use crate::metrics::Metrics;
    use crate::pipeline::router::ShardMap;
    use crate::sampler::QueueStats;
    use crossbeam_channel::unbounded;
    use std::sync::Arc;
    use std::time::Duration;

    fn dry_context() -> LoadContext {
        LoadContext {
            shards: ShardMap::new("127.0.0.1:1", "127.0.0.1:1", "127.0.0.1:1", "127.0.0.1:1"),
            dry_run: true,
            chunk_size: 100,
            queue_capacity: 4,
            buffer_size: 64 * 1024,
            socket_timeout: Duration::from_millis(100),
            retry: RetryPolicy::default(),
            normal_err_rate: 0.01,
            metrics: Metrics::new(),
            queue_stats: Arc::new(QueueStats::new(4)),
        }
    }

    #[test]
    fn sentinel_publishes_counters_and_exits() {
        let ctx = dry_context();
        let (tx, rx) = unbounded();
        let (stats_tx, stats_rx) = unbounded();

        tx.send(ShardMessage::Batch(vec![
            ("idfa:a".to_string(), vec![1]),
            ("idfa:b".to_string(), vec![2]),
        ]))
        .unwrap();
        tx.send(ShardMessage::Done).unwrap();

        run_shard_writer(DeviceType::Idfa, rx, stats_tx, &ctx);

        let stats = stats_rx.try_recv().unwrap();
        assert_eq!(stats.shard, DeviceType::Idfa);
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.errors, 0);
        assert!(stats_rx.try_recv().is_err(), "stats published exactly once");
    }

    #[test]
    fn disconnected_queue_counts_as_a_sentinel() {
        let ctx = dry_context();
        let (tx, rx) = unbounded::<ShardMessage>();
        let (stats_tx, stats_rx) = unbounded();
        drop(tx);

        run_shard_writer(DeviceType::Gaid, rx, stats_tx, &ctx);

        let stats = stats_rx.try_recv().unwrap();
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn unreachable_endpoint_charges_the_whole_batch() {
        let mut ctx = dry_context();
        ctx.dry_run = false;
        ctx.retry = RetryPolicy {
            tries: 1,
            delay: Duration::from_millis(1),
            backoff: 2.0,
        };
        let (tx, rx) = unbounded();
        let (stats_tx, stats_rx) = unbounded();

        tx.send(ShardMessage::Batch(vec![
            ("idfa:a".to_string(), vec![1]),
            ("idfa:b".to_string(), vec![2]),
        ]))
        .unwrap();
        tx.send(ShardMessage::Done).unwrap();

        run_shard_writer(DeviceType::Idfa, rx, stats_tx, &ctx);

        let stats = stats_rx.try_recv().unwrap();
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.errors, 2);
    }
}
