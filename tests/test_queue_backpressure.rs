//! Backpressure between the ingest and publish stages
//!
//! A slow broker must slow ingest down, never make it lose events.


use radio_bridge::bridge::{run_ingest, IngestOutcome, StopReason};
use radio_bridge::observability::MetricsCollector;
use radio_bridge::queue::transfer_queue;
use radio_bridge::serial::FrameSource;
use radio_bridge::testing::{MockFrameSource, MockTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test]
async fn test_slow_broker_loses_nothing() {
    let metrics = Arc::new(MetricsCollector::new());
    let lines: Vec<String> = (0..20)
        .map(|n| test_helpers::telemetry_line("8", &format!("n {n}")))
        .collect();
    let source = MockFrameSource::new(metrics.clone()).lines(lines);
    let transport = MockTransport::new().with_publish_delay(Duration::from_millis(5));
    let bridge = test_helpers::test_runner(source, transport.clone(), metrics.clone());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let summary = bridge.run(shutdown_rx).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.publish.published, 20);
    assert_eq!(summary.metrics.total_dropped_events(), 0);

    let order: Vec<String> = transport
        .get_published_payloads()
        .await
        .iter()
        .filter_map(|payload| payload["n"].as_str().map(str::to_string))
        .collect();
    let expected: Vec<String> = (0..20).map(|n| n.to_string()).collect();
    assert_eq!(order, expected);
}

#[tokio::test]
async fn test_ingest_waits_on_full_queue_until_shutdown() {
    let metrics = Arc::new(MetricsCollector::new());
    let mut source = MockFrameSource::new(metrics.clone()).lines([
        test_helpers::telemetry_line("1", "n 0"),
        test_helpers::telemetry_line("1", "n 1"),
        test_helpers::telemetry_line("1", "n 2"),
    ]);
    source.open().await.unwrap();

    // Nobody consumes, so the second event waits for space.
    let (mut queue_tx, mut queue_rx) = transfer_queue(1).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let policy = test_helpers::fast_policy(Some(1));

    let ingest_metrics = metrics.clone();
    let ingest = tokio::spawn(async move {
        run_ingest(
            &mut source,
            &mut queue_tx,
            &policy,
            &ingest_metrics,
            shutdown_rx,
        )
        .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!ingest.is_finished(), "ingest should be blocked on the full queue");
    assert_eq!(metrics.snapshot().ingest.events_enqueued, 1);

    shutdown_tx.send(true).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(2), ingest)
        .await
        .expect("ingest should stop once shutdown is requested")
        .unwrap();

    assert_eq!(outcome, IngestOutcome::ShutdownRequested);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.publish.events_dropped_on_shutdown, 1);
    assert_eq!(queue_rx.try_dequeue().map(|item| item.sequence), Some(1));
}
