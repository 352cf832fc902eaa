//! End-to-end bridge tests
//!
//! Drives the full runner (source → decoder → queue → publisher) against a
//! scripted frame source and an in-memory broker transport.


use radio_bridge::bridge::{BridgeState, StopReason};
use radio_bridge::error::BridgeError;
use radio_bridge::observability::MetricsCollector;
use radio_bridge::testing::{MockFrameSource, MockTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test]
async fn test_diagnostic_output_is_never_published() {
    let metrics = Arc::new(MetricsCollector::new());
    let source = MockFrameSource::new(metrics.clone()).lines([
        "*rx boot ok",
        "*freq 433.92",
        "*noise floor -110",
    ]);
    let transport = MockTransport::new();
    let bridge = test_helpers::test_runner(source, transport.clone(), metrics.clone());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let summary = bridge.run(shutdown_rx).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.metrics.ingest.diagnostic_frames, 3);
    assert!(transport.get_published_messages().await.is_empty());
    // Nothing to publish means no reason to connect.
    assert_eq!(transport.connect_calls(), 0);
}

#[tokio::test]
async fn test_malformed_frame_does_not_block_the_next_one() {
    let metrics = Arc::new(MetricsCollector::new());
    let source = MockFrameSource::new(metrics.clone()).lines([
        r#"{"_sender_id":"3","msg":"temp"#.to_string(),
        test_helpers::telemetry_line("3", "temp 21"),
    ]);
    let transport = MockTransport::new();
    let bridge = test_helpers::test_runner(source, transport.clone(), metrics.clone());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let summary = bridge.run(shutdown_rx).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.metrics.ingest.decode_failures, 1);
    assert_eq!(summary.publish.published, 1);
    assert_eq!(transport.get_published_payloads().await[0]["temp"], "21");
}

#[tokio::test]
async fn test_mixed_stream_routes_each_sender_in_order() {
    let metrics = Arc::new(MetricsCollector::new());
    let source = MockFrameSource::new(metrics.clone()).lines([
        "*rx boot ok".to_string(),
        test_helpers::telemetry_line("1", "temp 20.5"),
        "{not json".to_string(),
        test_helpers::telemetry_line("2", "hum 40"),
        String::new(),
        r#"{"_sender_id":"1"}"#.to_string(),
        test_helpers::telemetry_line("1", "temp 20.7"),
    ]);
    let transport = MockTransport::new();
    let bridge = test_helpers::test_runner(source, transport.clone(), metrics.clone());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let summary = bridge.run(shutdown_rx).await.unwrap();

    assert_eq!(summary.publish.published, 3);
    assert_eq!(
        transport.get_published_topics().await,
        vec![
            "home/radio/client1",
            "home/radio/client2",
            "home/radio/client1"
        ]
    );

    let payloads = transport.get_published_payloads().await;
    assert_eq!(payloads[0]["temp"], "20.5");
    assert_eq!(payloads[1]["hum"], "40");
    assert_eq!(payloads[2]["temp"], "20.7");
    assert!(payloads.iter().all(|payload| payload.get("msg").is_none()));
    assert!(payloads.iter().all(|payload| payload["_timestamp"].is_f64()));

    assert_eq!(summary.metrics.ingest.decode_failures, 2);
    assert_eq!(summary.metrics.ingest.diagnostic_frames, 1);
}

#[tokio::test]
async fn test_shutdown_drains_queued_events() {
    let metrics = Arc::new(MetricsCollector::new());
    let source = MockFrameSource::new(metrics.clone())
        .lines((0..3).map(|n| test_helpers::telemetry_line("6", &format!("n {n}"))))
        .hang();
    let transport = MockTransport::new().with_publish_delay(Duration::from_millis(10));
    let bridge = test_helpers::test_runner(source, transport.clone(), metrics.clone());
    let mut state_rx = bridge.subscribe_state();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = async {
        // Wait until the source is idle with everything queued, then stop.
        while metrics.snapshot().ingest.events_enqueued < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*state_rx.borrow_and_update(), BridgeState::Running);
        shutdown_tx.send(true).unwrap();
    };

    let (result, _) = tokio::time::timeout(
        Duration::from_secs(5),
        async { tokio::join!(bridge.run(shutdown_rx), driver) },
    )
    .await
    .expect("bridge should stop after shutdown");

    let summary = result.unwrap();
    assert_eq!(summary.stop_reason, StopReason::ShutdownRequested);
    assert_eq!(summary.publish.published, 3);
    assert!(!summary.publish.deadline_exceeded);
    assert_eq!(summary.metrics.total_dropped_events(), 0);
    assert_eq!(*state_rx.borrow(), BridgeState::Stopped);
    assert_eq!(transport.disconnect_calls(), 1);
}

#[tokio::test]
async fn test_serial_failure_is_recovered_by_reopening() {
    let metrics = Arc::new(MetricsCollector::new());
    let source = MockFrameSource::new(metrics.clone())
        .data(test_helpers::telemetry_line("2", "n 0"))
        .fail("device unplugged")
        .data(test_helpers::telemetry_line("2", "n 1"))
        .failing_reopens(1);
    let open_calls = source.open_calls.clone();
    let transport = MockTransport::new();
    let bridge = test_helpers::test_runner(source, transport.clone(), metrics.clone());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let summary = bridge.run(shutdown_rx).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.publish.published, 2);
    assert_eq!(summary.metrics.ingest.serial_reopens, 1);
    // One failed read plus one failed reopen.
    assert_eq!(summary.metrics.ingest.serial_errors, 2);
    assert_eq!(open_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_serial_failure_that_never_recovers_fails_the_run() {
    let metrics = Arc::new(MetricsCollector::new());
    let source = MockFrameSource::new(metrics.clone())
        .fail("device unplugged")
        .failing_reopens(u32::MAX);
    let transport = MockTransport::new();
    let bridge = test_helpers::test_runner(source, transport, metrics.clone());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let result = bridge.run(shutdown_rx).await;

    match result {
        Err(BridgeError::SourceFailed { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected source failure, got {other:?}"),
    }
    assert_eq!(metrics.snapshot().lifecycle.state, "stopped");
}

#[tokio::test]
async fn test_broker_down_at_startup_does_not_stop_ingest() {
    let metrics = Arc::new(MetricsCollector::new());
    let source = MockFrameSource::new(metrics.clone()).lines([
        test_helpers::telemetry_line("4", "n 0"),
        test_helpers::telemetry_line("4", "n 1"),
    ]);
    let transport = MockTransport::new().failing_connects(2);
    let bridge = test_helpers::test_runner(source, transport.clone(), metrics.clone());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let summary = bridge.run(shutdown_rx).await.unwrap();

    assert_eq!(summary.publish.published, 2);
    assert_eq!(summary.metrics.ingest.events_enqueued, 2);
    assert_eq!(summary.metrics.mqtt.connection_failures, 2);
}

#[tokio::test]
async fn test_oversized_frame_is_discarded() {
    let metrics = Arc::new(MetricsCollector::new());
    let long_line = test_helpers::telemetry_line("5", &"x ".repeat(100));
    let source = MockFrameSource::new(metrics.clone())
        .with_max_frame_bytes(64)
        .lines([long_line, test_helpers::telemetry_line("5", "n 1")]);
    let transport = MockTransport::new();
    let bridge = test_helpers::test_runner(source, transport.clone(), metrics.clone());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let summary = bridge.run(shutdown_rx).await.unwrap();

    assert_eq!(summary.metrics.ingest.oversized_frames, 1);
    assert_eq!(summary.publish.published, 1);
    assert_eq!(transport.get_published_payloads().await[0]["n"], "1");
}
