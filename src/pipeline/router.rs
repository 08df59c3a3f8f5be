//! Classifies chunks of raw lines into per-shard sub-batches.

use crate::proto;
use crate::record::{self, DeviceType, ParsedLine};

/// One key/payload pair bound for a shard endpoint.
pub type KeyedPayload = (String, Vec<u8>);

/// Device-type to endpoint table, fixed for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct ShardMap {
    addrs: [String; 4],
}

impl ShardMap {
    pub fn new(idfa: &str, gaid: &str, adid: &str, dvid: &str) -> Self {
        Self {
            addrs: [
                idfa.to_string(),
                gaid.to_string(),
                adid.to_string(),
                dvid.to_string(),
            ],
        }
    }

    pub fn addr(&self, dev: DeviceType) -> &str {
        &self.addrs[dev.index()]
    }
}

/// A chunk classified into per-shard sub-batches plus its error count.
#[derive(Debug, Default)]
pub struct RoutedChunk {
    batches: [Vec<KeyedPayload>; 4],
    pub errors: u64,
}

impl RoutedChunk {
    pub fn batch(&self, dev: DeviceType) -> &[KeyedPayload] {
        &self.batches[dev.index()]
    }

    /// Hands the shard's sub-batch off, leaving an empty one behind.
    pub fn take_batch(&mut self, dev: DeviceType) -> Vec<KeyedPayload> {
        std::mem::take(&mut self.batches[dev.index()])
    }
}

/// Walks an ordered chunk: blank lines are skipped silently, malformed
/// lines and unknown device tags are counted as errors, and surviving
/// records are encoded and appended to their shard's sub-batch in order.
///
/// Encoding always happens here, dry-run included, so codec defects
/// surface without touching the network.
pub fn route_chunk(lines: &[String]) -> RoutedChunk {
    let mut routed = RoutedChunk::default();

    for raw in lines {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let rec = match record::parse_line(line) {
            ParsedLine::Valid(rec)
            | ParsedLine::FilteredApps(rec)
            | ParsedLine::ZeroedGeo(rec) => rec,
            ParsedLine::UnknownDevice(tag) => {
                eprintln!("[ERROR] Unknown device type: {tag}");
                routed.errors += 1;
                continue;
            }
            ParsedLine::Invalid => {
                eprintln!("[INFO] Skipping malformed line: `{line}`");
                routed.errors += 1;
                continue;
            }
        };

        let (key, payload) = proto::pack_record(&rec);
        routed.batches[rec.dev_type.index()].push((key, payload));
    }

    routed
}
