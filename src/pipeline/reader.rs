use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::Result;
use crate::metrics::Metrics;

/// A wrapper reader that tracks bytes consumed for metrics.
pub struct TrackedReader<R> {
    inner: R,
    metrics: Metrics,
}

impl<R> TrackedReader<R> {
    pub fn new(inner: R, metrics: Metrics) -> Self {
        Self { inner, metrics }
    }
}

impl<R: Read> Read for TrackedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let bytes = self.inner.read(buf)?;
        self.metrics.add_bytes_read(bytes as u64);
        Ok(bytes)
    }
}

pub type LogReader = BufReader<TrackedReader<Box<dyn Read + Send>>>;

/// Opens an input log as a buffered line reader.
/// `.gz` files are decompressed on the fly; anything else is read as-is.
/// Tracks bytes read via the provided Metrics.
pub fn open_log_reader(path: &Path, buffer_size: usize, metrics: &Metrics) -> Result<LogReader> {
    let file = File::open(path)?;

    let raw: Box<dyn Read + Send> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let tracked = TrackedReader::new(raw, metrics.clone());
    Ok(BufReader::with_capacity(buffer_size, tracked))
}

/// Reads up to `chunk_size` lines; an empty chunk means end of input.
pub fn read_chunk<R: BufRead>(reader: &mut R, chunk_size: usize) -> Result<Vec<String>> {
    let mut chunk = Vec::with_capacity(chunk_size);
    for line in reader.lines().take(chunk_size) {
        chunk.push(line?);
    }
    Ok(chunk)
}
