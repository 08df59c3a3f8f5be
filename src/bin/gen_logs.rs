//! Synthetic appsinstalled fixture generator for local runs and benchmarks.

use anyhow::Result;
use clap::Parser;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gen_logs")]
#[command(about = "Writes synthetic .tsv.gz appsinstalled fixtures")]
struct Args {
    /// Output directory
    #[arg(short, long, default_value = "data")]
    out_dir: PathBuf,

    /// Number of files to write
    #[arg(short, long, default_value_t = 1)]
    files: usize,

    /// Lines per file
    #[arg(short, long, default_value_t = 10_000)]
    lines: usize,

    /// Emit one malformed line every N lines (0 = never)
    #[arg(long, default_value_t = 0)]
    junk_every: usize,
}

const TAGS: [&str; 4] = ["idfa", "gaid", "adid", "dvid"];

fn main() -> Result<()> {
    let args = Args::parse();
    fs::create_dir_all(&args.out_dir)?;

    for file_no in 0..args.files {
        let path = args.out_dir.join(format!("appsinstalled_{file_no:03}.tsv.gz"));
        let mut gz = GzEncoder::new(File::create(&path)?, Compression::fast());

        for i in 0..args.lines {
            if args.junk_every > 0 && i > 0 && i % args.junk_every == 0 {
                writeln!(gz, "truncated line")?;
                continue;
            }
            let tag = TAGS[i % TAGS.len()];
            let lat = -90.0 + (i % 180) as f64 + 0.5;
            let lon = -180.0 + (i % 360) as f64 + 0.25;
            let apps: Vec<String> = (0..(i % 7 + 1))
                .map(|a| (a * 13 + i % 100).to_string())
                .collect();
            writeln!(
                gz,
                "{tag}\tdev{:08x}{:08x}\t{lat}\t{lon}\t{}",
                file_no,
                i,
                apps.join(",")
            )?;
        }

        gz.finish()?;
        eprintln!("[INFO] Wrote {}", path.display());
    }

    Ok(())
}
