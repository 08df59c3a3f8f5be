mod support;

use std::time::{Duration, Instant};

use memc_load::memc::{set_multi_retrying, MemcClient, RetryPolicy};
use memc_load::pipeline::processor::{process_log, LoadVerdict};

use support::{context, single_endpoint, write_gz, MockMemcached};

fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        tries: 3,
        delay: Duration::from_millis(20),
        backoff: 2.0,
    }
}

#[test]
fn transient_refusals_succeed_on_the_third_attempt() {
    let memc = MockMemcached::start();
    memc.fail_first("idfa:aaa", 2);

    let mut client = MemcClient::new(memc.addr(), Duration::from_secs(2));
    let batch = vec![("idfa:aaa".to_string(), b"payload".to_vec())];

    let started = Instant::now();
    let outcome = set_multi_retrying(&mut client, &batch, &quick_policy()).unwrap();

    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.failed, 0);
    assert_eq!(memc.attempts_for("idfa:aaa"), 3);
    assert_eq!(memc.stored_keys(), vec!["idfa:aaa"]);
    // Two sleeps: delay, then delay * backoff.
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[test]
fn permanent_refusal_exhausts_the_attempts() {
    let memc = MockMemcached::start();
    memc.fail_always("gaid:bbb");

    let mut client = MemcClient::new(memc.addr(), Duration::from_secs(2));
    let batch = vec![("gaid:bbb".to_string(), b"payload".to_vec())];

    let outcome = set_multi_retrying(&mut client, &batch, &quick_policy()).unwrap();

    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.failed, 1);
    assert_eq!(memc.attempts_for("gaid:bbb"), 3);
    assert!(memc.stored_keys().is_empty());
}

#[test]
fn refused_keys_become_file_errors_and_trip_the_gate() {
    let memc = MockMemcached::start();
    memc.fail_always("idfa:bad");

    let dir = tempfile::tempdir().unwrap();
    let path = write_gz(
        dir.path(),
        "t1.tsv.gz",
        &["idfa\tgood\t1.0\t2.0\t1", "idfa\tbad\t1.0\t2.0\t2"],
    );

    let ctx = context(single_endpoint(memc.addr()), false);
    let stats = process_log(&path, &ctx).unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.verdict, LoadVerdict::Rejected { err_rate: 1.0 });
    assert_eq!(memc.attempts_for("idfa:bad"), 3);
    assert_eq!(memc.stored_keys(), vec!["idfa:good"]);
}

#[test]
fn one_flaky_key_does_not_resubmit_the_healthy_ones() {
    let memc = MockMemcached::start();
    memc.fail_first("idfa:flaky", 1);

    let mut client = MemcClient::new(memc.addr(), Duration::from_secs(2));
    let batch = vec![
        ("idfa:steady".to_string(), b"a".to_vec()),
        ("idfa:flaky".to_string(), b"b".to_vec()),
    ];

    let outcome = set_multi_retrying(&mut client, &batch, &quick_policy()).unwrap();

    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(memc.attempts_for("idfa:steady"), 1);
    assert_eq!(memc.attempts_for("idfa:flaky"), 2);
}
