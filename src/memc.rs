//! Minimal memcached text-protocol client: a lazy keep-alive connection per
//! shard, pipelined multi-set, and an explicit bounded-retry loop.

use std::collections::HashSet;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crate::pipeline::router::KeyedPayload;

pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(2);

/// Bounded-retry parameters for one bulk set.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first submission included.
    pub tries: u32,
    /// Sleep before the second attempt.
    pub delay: Duration,
    /// Multiplier applied to the sleep after each round.
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: 3,
            delay: Duration::from_millis(500),
            backoff: 2.0,
        }
    }
}

/// What a retried bulk set ended up doing.
#[derive(Debug, Clone, Copy)]
pub struct SetOutcome {
    /// Keys still unacknowledged after the last attempt.
    pub failed: u64,
    /// Attempts actually made.
    pub attempts: u32,
}

/// One connection to one shard endpoint.
///
/// The connection opens on first use and survives across batches; any
/// transport error drops it so the next call reconnects.
pub struct MemcClient {
    addr: String,
    timeout: Duration,
    conn: Option<BufReader<TcpStream>>,
}

impl MemcClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            conn: None,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn close(&mut self) {
        self.conn = None;
    }

    fn connection(&mut self) -> io::Result<&mut BufReader<TcpStream>> {
        if self.conn.is_none() {
            let mut last_err = io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address resolved for {}", self.addr),
            );
            let mut stream = None;
            for addr in self.addr.to_socket_addrs()? {
                match TcpStream::connect_timeout(&addr, self.timeout) {
                    Ok(s) => {
                        stream = Some(s);
                        break;
                    }
                    Err(e) => last_err = e,
                }
            }
            let stream = stream.ok_or(last_err)?;
            stream.set_read_timeout(Some(self.timeout))?;
            stream.set_write_timeout(Some(self.timeout))?;
            stream.set_nodelay(true)?;
            self.conn = Some(BufReader::new(stream));
        }
        Ok(self.conn.as_mut().expect("connection just established"))
    }

    /// Pipelined `set` of every pair in one round trip.
    ///
    /// Returns the keys the server refused. Transport errors drop the
    /// connection before propagating.
    pub fn set_multi(&mut self, pairs: &[KeyedPayload]) -> io::Result<HashSet<String>> {
        if pairs.is_empty() {
            return Ok(HashSet::new());
        }
        let result = self.try_set_multi(pairs);
        if result.is_err() {
            self.close();
        }
        result
    }

    fn try_set_multi(&mut self, pairs: &[KeyedPayload]) -> io::Result<HashSet<String>> {
        let conn = self.connection()?;

        let mut request = Vec::new();
        for (key, value) in pairs {
            write!(request, "set {} 0 0 {}\r\n", key, value.len())?;
            request.extend_from_slice(value);
            request.extend_from_slice(b"\r\n");
        }
        conn.get_mut().write_all(&request)?;
        conn.get_mut().flush()?;

        let mut failed = HashSet::new();
        let mut line = String::new();
        for (key, _) in pairs {
            line.clear();
            if conn.read_line(&mut line)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-response",
                ));
            }
            if line.trim_end() != "STORED" {
                failed.insert(key.clone());
            }
        }
        Ok(failed)
    }
}

/// Bulk set with bounded retries over the failed subset.
///
/// Sleeps `delay` between rounds, multiplying by `backoff` each time, and
/// resubmits only the keys the server refused.
pub fn set_multi_retrying(
    client: &mut MemcClient,
    batch: &[KeyedPayload],
    policy: &RetryPolicy,
) -> io::Result<SetOutcome> {
    let mut failed = client.set_multi(batch)?;
    let mut attempts: u32 = 1;
    let mut delay = policy.delay;

    while !failed.is_empty() && attempts < policy.tries {
        thread::sleep(delay);
        delay = delay.mul_f64(policy.backoff);
        let pending: Vec<KeyedPayload> = batch
            .iter()
            .filter(|(key, _)| failed.contains(key))
            .cloned()
            .collect();
        failed = client.set_multi(&pending)?;
        attempts += 1;
    }

    Ok(SetOutcome {
        failed: failed.len() as u64,
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// One-connection stub: refuses every `set` of a key containing "flaky"
    /// until that key has been attempted `accept_after` times.
    fn spawn_stub(accept_after: u32) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let flaky_attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&flaky_attempts);

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut stream = stream;
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    return;
                }
                let parts: Vec<&str> = line.split_whitespace().collect();
                let key = parts[1].to_string();
                let len: usize = parts[4].parse().unwrap();
                let mut value = vec![0u8; len + 2];
                reader.read_exact(&mut value).unwrap();

                let reply = if key.contains("flaky") {
                    let seen = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if seen >= accept_after {
                        "STORED\r\n"
                    } else {
                        "NOT_STORED\r\n"
                    }
                } else {
                    "STORED\r\n"
                };
                stream.write_all(reply.as_bytes()).unwrap();
            }
        });

        (addr, flaky_attempts)
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            tries: 3,
            delay: Duration::from_millis(5),
            backoff: 2.0,
        }
    }

    #[test]
    fn default_policy_matches_the_documented_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.tries, 3);
        assert_eq!(policy.delay, Duration::from_millis(500));
        assert_eq!(policy.backoff, 2.0);
    }

    #[test]
    fn set_multi_reports_refused_keys() {
        let (addr, _) = spawn_stub(u32::MAX);
        let mut client = MemcClient::new(addr, DEFAULT_SOCKET_TIMEOUT);
        let batch = vec![
            ("idfa:ok".to_string(), b"a".to_vec()),
            ("idfa:flaky".to_string(), b"b".to_vec()),
        ];
        let failed = client.set_multi(&batch).unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed.contains("idfa:flaky"));
    }

    #[test]
    fn retries_resubmit_only_the_failed_subset() {
        let (addr, flaky_attempts) = spawn_stub(3);
        let mut client = MemcClient::new(addr, DEFAULT_SOCKET_TIMEOUT);
        let batch = vec![
            ("idfa:ok".to_string(), b"a".to_vec()),
            ("idfa:flaky".to_string(), b"b".to_vec()),
        ];
        let outcome = set_multi_retrying(&mut client, &batch, &quick_retry()).unwrap();
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.attempts, 3);
        // The healthy key went over the wire once; only the refused key
        // was resubmitted.
        assert_eq!(flaky_attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausted_retries_surface_the_remaining_failures() {
        let (addr, flaky_attempts) = spawn_stub(u32::MAX);
        let mut client = MemcClient::new(addr, DEFAULT_SOCKET_TIMEOUT);
        let batch = vec![("gaid:flaky".to_string(), b"x".to_vec())];
        let outcome = set_multi_retrying(&mut client, &batch, &quick_retry()).unwrap();
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(flaky_attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn empty_batch_is_never_submitted() {
        // No listener behind this address; an empty batch must not connect.
        let mut client = MemcClient::new("127.0.0.1:1", Duration::from_millis(50));
        let failed = client.set_multi(&[]).unwrap();
        assert!(failed.is_empty());
    }

    #[test]
    fn transport_error_is_an_io_error() {
        let mut client = MemcClient::new("127.0.0.1:1", Duration::from_millis(50));
        let batch = vec![("idfa:a".to_string(), b"v".to_vec())];
        assert!(client.set_multi(&batch).is_err());
    }
}
