//! Shared helpers for the integration tests: a scripted in-process
//! memcached endpoint, context construction, and gzip fixtures.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;

use memc_load::memc::RetryPolicy;
use memc_load::metrics::Metrics;
use memc_load::pipeline::router::ShardMap;
use memc_load::pipeline::LoadContext;
use memc_load::sampler::QueueStats;

#[derive(Default)]
pub struct ServerState {
    /// Accepted (key, value) pairs in arrival order.
    pub stored: Vec<(String, Vec<u8>)>,
    /// Per-key set attempts, accepted or not.
    pub attempts: HashMap<String, u32>,
    /// Refuse the first N attempts for these keys.
    pub fail_first: HashMap<String, u32>,
    /// Refuse every attempt for these keys.
    pub fail_always: HashSet<String>,
}

/// A memcached endpoint that records every `set` and refuses keys on cue.
pub struct MockMemcached {
    addr: String,
    state: Arc<Mutex<ServerState>>,
}

impl MockMemcached {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock memcached");
        let addr = listener.local_addr().expect("local addr").to_string();
        let state = Arc::new(Mutex::new(ServerState::default()));

        let accept_state = Arc::clone(&state);
        thread::spawn(move || {
            for conn in listener.incoming() {
                let Ok(stream) = conn else { break };
                let conn_state = Arc::clone(&accept_state);
                thread::spawn(move || serve(stream, conn_state));
            }
        });

        Self { addr, state }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().expect("mock state lock")
    }

    pub fn fail_first(&self, key: &str, times: u32) {
        self.state().fail_first.insert(key.to_string(), times);
    }

    pub fn fail_always(&self, key: &str) {
        self.state().fail_always.insert(key.to_string());
    }

    pub fn stored_keys(&self) -> Vec<String> {
        self.state().stored.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn stored_value(&self, key: &str) -> Option<Vec<u8>> {
        self.state()
            .stored
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn attempts_for(&self, key: &str) -> u32 {
        self.state().attempts.get(key).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.state().attempts.values().sum()
    }
}

fn serve(stream: TcpStream, state: Arc<Mutex<ServerState>>) {
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });
    let mut stream = stream;
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 5 || parts[0] != "set" {
            if stream.write_all(b"ERROR\r\n").is_err() {
                return;
            }
            continue;
        }
        let key = parts[1].to_string();
        let len: usize = parts[4].parse().unwrap_or(0);
        let mut value = vec![0u8; len + 2]; // payload + CRLF
        if reader.read_exact(&mut value).is_err() {
            return;
        }
        value.truncate(len);

        let reply = {
            let mut st = state.lock().expect("mock state lock");
            let seen = {
                let counter = st.attempts.entry(key.clone()).or_insert(0);
                *counter += 1;
                *counter
            };
            let refuse = st.fail_always.contains(&key)
                || st.fail_first.get(&key).is_some_and(|&n| seen <= n);
            if refuse {
                "NOT_STORED\r\n"
            } else {
                st.stored.push((key, value));
                "STORED\r\n"
            }
        };
        if stream.write_all(reply.as_bytes()).is_err() {
            return;
        }
    }
}

/// A context wired to the given shard endpoints, with fast retries so the
/// tests stay quick.
pub fn context(shards: ShardMap, dry_run: bool) -> LoadContext {
    LoadContext {
        shards,
        dry_run,
        chunk_size: 100,
        queue_capacity: 16,
        buffer_size: 64 * 1024,
        socket_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            tries: 3,
            delay: Duration::from_millis(10),
            backoff: 2.0,
        },
        normal_err_rate: 0.01,
        metrics: Metrics::new(),
        queue_stats: Arc::new(QueueStats::new(16)),
    }
}

/// Routes all four device types to the same endpoint.
pub fn single_endpoint(addr: &str) -> ShardMap {
    ShardMap::new(addr, addr, addr, addr)
}

/// Writes a gzip log fixture with one line per entry.
pub fn write_gz(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut gz = GzEncoder::new(
        File::create(&path).expect("create fixture"),
        Compression::default(),
    );
    for line in lines {
        writeln!(gz, "{line}").expect("write fixture line");
    }
    gz.finish().expect("finish fixture");
    path
}
