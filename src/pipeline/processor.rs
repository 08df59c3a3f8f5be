//! Per-file orchestration: spawn the shard writers, stream the file in
//! chunks, route and enqueue, then drain everything and judge the result.

use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{bounded, unbounded, Sender};
use serde::Serialize;

use crate::error::Result;
use crate::pipeline::reader::{open_log_reader, read_chunk};
use crate::pipeline::router::route_chunk;
use crate::pipeline::writer::{run_shard_writer, ShardMessage, WorkerStats};
use crate::pipeline::LoadContext;
use crate::record::DeviceType;

/// Per-file verdict from the error-rate gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum LoadVerdict {
    /// errors/processed stayed below the threshold
    Accepted { err_rate: f64 },
    /// errors/processed reached the threshold
    Rejected { err_rate: f64 },
    /// nothing was processed; no write was ever attempted
    Empty,
}

/// Totals for one fully drained input file.
#[derive(Debug, Clone, Serialize)]
pub struct FileStats {
    pub path: PathBuf,
    pub lines_read: u64,
    pub processed: u64,
    pub errors: u64,
    #[serde(flatten)]
    pub verdict: LoadVerdict,
}

/// The acceptance predicate `errors / processed < threshold`.
pub fn error_rate_verdict(processed: u64, errors: u64, threshold: f64) -> LoadVerdict {
    if processed == 0 {
        return LoadVerdict::Empty;
    }
    let err_rate = errors as f64 / processed as f64;
    if err_rate < threshold {
        LoadVerdict::Accepted { err_rate }
    } else {
        LoadVerdict::Rejected { err_rate }
    }
}

/// Ingests one input file end to end.
///
/// The gzip handle, shard connections and worker threads are all scoped to
/// this call; every exit path drains the writers through the sentinel.
pub fn process_log(path: &Path, ctx: &LoadContext) -> Result<FileStats> {
    eprintln!("[INFO] Processing {}", path.display());

    let (stats_tx, stats_rx) = unbounded::<WorkerStats>();
    let mut senders: Vec<Sender<ShardMessage>> = Vec::with_capacity(DeviceType::ALL.len());
    let mut workers = Vec::with_capacity(DeviceType::ALL.len());

    for shard in DeviceType::ALL {
        let (tx, rx) = bounded::<ShardMessage>(ctx.queue_capacity);
        let stats_tx = stats_tx.clone();
        let worker_ctx = ctx.clone();
        let handle = thread::Builder::new()
            .name(format!("memc-{shard}"))
            .spawn(move || run_shard_writer(shard, rx, stats_tx, &worker_ctx))?;
        senders.push(tx);
        workers.push(handle);
    }
    drop(stats_tx);

    let mut reader = open_log_reader(path, ctx.buffer_size, &ctx.metrics)?;
    let mut lines_read: u64 = 0;
    let mut route_errors: u64 = 0;

    'read: loop {
        let chunk = read_chunk(&mut reader, ctx.chunk_size)?;
        if chunk.is_empty() {
            break;
        }
        lines_read += chunk.len() as u64;
        ctx.metrics.add_lines(chunk.len() as u64);

        let mut routed = route_chunk(&chunk);
        route_errors += routed.errors;
        ctx.metrics.add_errors(routed.errors);

        for shard in DeviceType::ALL {
            let batch = routed.take_batch(shard);
            if batch.is_empty() {
                continue;
            }
            let sender = &senders[shard.index()];
            ctx.queue_stats.record_fullness(sender.len());
            if sender.send(ShardMessage::Batch(batch)).is_err() {
                // The writer is gone; stop producing instead of hanging.
                eprintln!(
                    "[ERROR] {shard} writer died, aborting read of {}",
                    path.display()
                );
                break 'read;
            }
            ctx.metrics.inc_batches();
        }
    }
    drop(reader);

    for sender in &senders {
        let _ = sender.send(ShardMessage::Done);
    }
    drop(senders);

    for handle in workers {
        if handle.join().is_err() {
            eprintln!(
                "[ERROR] A shard writer panicked while loading {}",
                path.display()
            );
        }
    }

    let mut processed: u64 = 0;
    let mut errors: u64 = route_errors;
    for stats in stats_rx.try_iter() {
        processed += stats.processed;
        errors += stats.errors;
    }

    eprintln!(
        "[INFO] File: {} | lines: {lines_read} | processed: {processed} | errors: {errors}",
        path.display()
    );

    let verdict = error_rate_verdict(processed, errors, ctx.normal_err_rate);
    match verdict {
        LoadVerdict::Accepted { err_rate } => eprintln!(
            "[INFO] File: {} | Acceptable error rate ({err_rate:?}). Successful load",
            path.display()
        ),
        LoadVerdict::Rejected { err_rate } => eprintln!(
            "[ERROR] File: {} | High error rate ({err_rate:?} >= {}). Failed load",
            path.display(),
            ctx.normal_err_rate
        ),
        LoadVerdict::Empty => {
            eprintln!("[WARN] File: {} | No records processed", path.display())
        }
    }

    Ok(FileStats {
        path: path.to_path_buf(),
        lines_read,
        processed,
        errors,
        verdict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_processed_is_empty() {
        assert_eq!(error_rate_verdict(0, 0, 0.01), LoadVerdict::Empty);
        assert_eq!(error_rate_verdict(0, 5, 0.01), LoadVerdict::Empty);
    }

    #[test]
    fn below_threshold_is_accepted() {
        let verdict = error_rate_verdict(1000, 9, 0.01);
        assert_eq!(verdict, LoadVerdict::Accepted { err_rate: 0.009 });
    }

    #[test]
    fn at_threshold_is_rejected() {
        let verdict = error_rate_verdict(100, 1, 0.01);
        assert_eq!(verdict, LoadVerdict::Rejected { err_rate: 0.01 });
    }

    #[test]
    fn clean_load_reports_zero_rate() {
        let verdict = error_rate_verdict(2, 0, 0.01);
        assert_eq!(verdict, LoadVerdict::Accepted { err_rate: 0.0 });
    }
}
