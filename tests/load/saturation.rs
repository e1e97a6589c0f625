//! Saturation scenarios
//!
//! Full-size batches against the stub with its real ten second delay. The
//! point is that elapsed time tracks one delay, not N of them.

use std::time::Duration;

use stress_harness::config::Config;
use stress_harness::lifecycle::{Harness, ShutdownOutcome};
use stress_harness::signals::TerminationSignal;
use tokio::sync::mpsc;

const DELAY: Duration = Duration::from_secs(10);

async fn run(toml: &str) -> stress_harness::lifecycle::RunReport {
    let cfg = Config::from_toml_str(toml).expect("scenario config");
    let (tx, rx) = mpsc::channel(1);
    tx.send(TerminationSignal::Terminate).await.unwrap();
    Harness::new(cfg).run(rx).await.expect("scenario run")
}

/// Test: 1000 unvalidated requests complete in roughly one delay
#[tokio::test(flavor = "multi_thread")]
#[ignore] // Ignore by default as this is a slow test
async fn test_thousand_requests_without_identifier() {
    let report = run(
        r#"
        [server]
        port = 0
        [stub]
        delay_ms = 10000
        echo = false
        require_counter = false
        [batch]
        concurrency = 1000
        method = "get"
        identifier = "none"
        "#,
    )
    .await;

    println!(
        "confirmed {} of {} in {:?}",
        report.record.confirmed(),
        report.record.batch_size,
        report.record.elapsed
    );
    assert_eq!(report.record.confirmed(), 1000);
    assert!(report.record.elapsed >= DELAY);
    assert!(
        report.record.elapsed < DELAY * 3,
        "requests were serialized: {:?}",
        report.record.elapsed
    );
    assert_eq!(report.shutdown, ShutdownOutcome::ListenerClosed);
}

/// Test: 10000 validated requests, counter always supplied
#[tokio::test(flavor = "multi_thread")]
#[ignore] // Ignore by default as this is a slow test
async fn test_ten_thousand_validated_requests() {
    let report = run(
        r#"
        [server]
        port = 0
        [stub]
        delay_ms = 10000
        require_counter = true
        [batch]
        concurrency = 10000
        method = "post"
        identifier = "sequence"
        "#,
    )
    .await;

    println!(
        "confirmed {} of {} between {} and {}",
        report.record.confirmed(),
        report.record.batch_size,
        report.record.started_at,
        report.record.stopped_at
    );
    assert_eq!(report.record.confirmed(), 10_000);
    assert_eq!(report.outcome.rejected, 0);
    assert!(report.record.elapsed >= DELAY);
    assert!(report.record.stopped_at > report.record.started_at);
}
