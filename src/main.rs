use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;

use memc_load::cli::Args;
use memc_load::config::Settings;
use memc_load::metrics::Metrics;
use memc_load::pipeline::LoadContext;
use memc_load::proto;
use memc_load::report::{RunReport, RunStatus};
use memc_load::runs::{cleanup_old_runs, RunContext};
use memc_load::sampler::ResourceSampler;
use memc_load::supervisor::{self, LoadSummary};

/// A writer that tees output to both a file and stderr.
struct TeeWriter {
    file: BufWriter<File>,
}

impl TeeWriter {
    fn new(file: File) -> Self {
        Self {
            file: BufWriter::new(file),
        }
    }

    fn writeln(&mut self, msg: &str) {
        // Write to stderr
        eprintln!("{}", msg);
        // Write to file
        let _ = writeln!(self.file, "{}", msg);
        let _ = self.file.flush();
    }
}

/// Log macro that writes to both file and stderr via TeeWriter.
macro_rules! log {
    ($writer:expr, $($arg:tt)*) => {
        $writer.writeln(&format!($($arg)*))
    };
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.test {
        proto::self_test().context("codec self-test failed")?;
        println!("Codec self-test passed");
        return Ok(());
    }

    // Load settings from YAML, with CLI overrides
    let settings = Settings::load_from_yaml(args.config.as_deref())?;
    let settings = settings.merge_with_cli(
        args.pattern,
        args.idfa,
        args.gaid,
        args.adid,
        args.dvid,
        args.workers,
    );

    // Create run context (timestamped directory, optionally overridden)
    let run_context = RunContext::with_run_id(&settings.runs.runs_dir, args.run_id)?;

    // Set up tee logging to both file and stderr
    let log_path = args.log.unwrap_or_else(|| run_context.log_path());
    let log_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file at {}", log_path.display()))?;
    let mut logger = TeeWriter::new(log_file);

    log!(logger, "[INFO] Run ID: {}", run_context.run_id);
    log!(
        logger,
        "[INFO] Run directory: {}",
        run_context.run_dir.display()
    );

    // Save config snapshot
    settings.save_snapshot(&run_context.config_snapshot_path())?;
    log!(
        logger,
        "[INFO] Config snapshot saved to {}",
        run_context.config_snapshot_path().display()
    );

    log!(logger, "[INFO] Memc loader started");
    log!(logger, "[INFO]   Pattern: {}", settings.ingest.pattern);
    log!(
        logger,
        "[INFO]   Shards: idfa={} gaid={} adid={} dvid={}",
        settings.ingest.idfa,
        settings.ingest.gaid,
        settings.ingest.adid,
        settings.ingest.dvid
    );
    log!(logger, "[INFO]   Workers: {}", settings.performance.workers);
    log!(
        logger,
        "[INFO]   Chunk size: {}",
        settings.performance.chunk_size
    );
    log!(
        logger,
        "[INFO]   Queue capacity: {}",
        settings.performance.queue_capacity
    );
    log!(logger, "[INFO]   Dry run: {}", args.dry);

    let metrics = Metrics::new();
    let ctx = LoadContext::from_settings(&settings, args.dry, metrics.clone());

    // Start a lightweight terminal progress bar that updates from Metrics
    let progress_running = Arc::new(AtomicBool::new(true));
    let progress_flag = Arc::clone(&progress_running);
    let progress_metrics = metrics.clone();
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("[{spinner}] {msg}").unwrap());
    pb.enable_steady_tick(std::time::Duration::from_millis(200));
    let progress_handle = thread::spawn(move || {
        while progress_flag.load(Ordering::Relaxed) {
            let elapsed = progress_metrics.elapsed_secs();
            let files = progress_metrics.files_loaded();
            let records = progress_metrics.records_processed();
            let errors = progress_metrics.record_errors();
            let bytes_read = progress_metrics.bytes_read();
            let rps = if elapsed > 0.0 {
                records as f64 / elapsed
            } else {
                0.0
            };
            let mb_read = bytes_read as f64 / (1024.0 * 1024.0);
            pb.set_message(format!(
                "files: {} | records: {} ({:.0}/s) | errors: {} | read: {:.2} MB",
                files, records, rps, errors, mb_read
            ));
            std::thread::sleep(std::time::Duration::from_millis(200));
        }
        pb.finish_and_clear();
    });

    // Start resource sampler (background thread sampling at 1Hz)
    let mut sampler = ResourceSampler::start(Arc::clone(&ctx.queue_stats));

    let load_result = supervisor::run(&settings.ingest.pattern, settings.performance.workers, &ctx);

    // Stop the sampler
    sampler.stop();

    // Generate report (even on error)
    let status = match &load_result {
        Ok(_) => RunStatus::Success,
        Err(e) => RunStatus::Error {
            message: format!("{:#}", e),
        },
    };
    let files = load_result
        .as_ref()
        .map(|summary| summary.files.clone())
        .unwrap_or_default();

    let report = RunReport::generate(&run_context, &metrics, &sampler, status, files);

    // Attempt to save report
    if let Err(e) = report.save_yaml(&run_context.report_path()) {
        log!(logger, "[ERROR] Failed to save report: {}", e);
    } else {
        log!(
            logger,
            "[INFO] Report saved to {}",
            run_context.report_path().display()
        );
    }

    // Print totals
    if let Ok(summary) = &load_result {
        print_summary_to_tee(&metrics, summary, &mut logger);
    }

    // Stop and join progress bar thread
    progress_running.store(false, Ordering::Relaxed);
    let _ = progress_handle.join();

    // Cleanup old runs
    if let Err(e) = cleanup_old_runs(&settings.runs.runs_dir, settings.runs.keep_runs) {
        log!(logger, "[WARN] Failed to cleanup old runs: {}", e);
    }

    load_result
        .map(|_| ())
        .context("Unexpected error at the supervisor layer")
}

fn print_summary_to_tee(metrics: &Metrics, summary: &LoadSummary, logger: &mut TeeWriter) {
    let elapsed = metrics.elapsed_secs();
    let records = metrics.records_processed();
    let rps = if elapsed > 0.0 {
        records as f64 / elapsed
    } else {
        0.0
    };
    let mb_read = metrics.bytes_read() as f64 / (1024.0 * 1024.0);

    log!(logger, "");
    log!(logger, "=== Load Summary ===");
    log!(logger, "Files renamed:     {}", summary.renamed);
    log!(logger, "Files failed:      {}", summary.failed_files);
    log!(logger, "Lines read:        {}", metrics.lines_read());
    log!(logger, "Records processed: {}", records);
    log!(logger, "Record errors:     {}", metrics.record_errors());
    log!(logger, "Batches sent:      {}", metrics.batches_sent());
    log!(logger, "Set retries:       {}", metrics.set_retries());
    log!(logger, "Time elapsed:      {:.2}s", elapsed);
    log!(logger, "Throughput:        {:.0} records/sec", rps);
    log!(logger, "Bytes read:        {:.2} MB", mb_read);
}
