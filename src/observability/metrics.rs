//! Thread-safe metrics collection
//!
//! Atomic counters for every stage of the bridge. Each dropped frame or
//! event increments exactly one counter, so a snapshot accounts for all
//! telemetry that did not reach the broker.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Counters shared by the ingest stage, the publish stage and the runner
#[derive(Debug)]
pub struct MetricsCollector {
    // Ingest stage
    frames_read: AtomicU64,
    diagnostic_frames: AtomicU64,
    oversized_frames: AtomicU64,
    decode_failures: AtomicU64,
    events_enqueued: AtomicU64,
    serial_errors: AtomicU64,
    serial_reopens: AtomicU64,

    // Publish stage
    events_dequeued: AtomicU64,
    events_published: AtomicU64,
    routing_failures: AtomicU64,
    publish_attempt_failures: AtomicU64,
    events_dropped_after_retries: AtomicU64,
    events_dropped_on_shutdown: AtomicU64,

    // Broker connection
    mqtt_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,

    // Lifecycle
    bridge_state: Mutex<String>,
    state_transitions: AtomicU64,
    uptime_start: AtomicU64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            frames_read: AtomicU64::new(0),
            diagnostic_frames: AtomicU64::new(0),
            oversized_frames: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            events_enqueued: AtomicU64::new(0),
            serial_errors: AtomicU64::new(0),
            serial_reopens: AtomicU64::new(0),
            events_dequeued: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            routing_failures: AtomicU64::new(0),
            publish_attempt_failures: AtomicU64::new(0),
            events_dropped_after_retries: AtomicU64::new(0),
            events_dropped_on_shutdown: AtomicU64::new(0),
            mqtt_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            bridge_state: Mutex::new("starting".to_string()),
            state_transitions: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Ingest stage
    pub fn frame_read(&self) {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn diagnostic_frame_skipped(&self) {
        self.diagnostic_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn oversized_frame_discarded(&self) {
        self.oversized_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_enqueued(&self) {
        self.events_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn serial_error(&self) {
        self.serial_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn serial_reopened(&self) {
        self.serial_reopens.fetch_add(1, Ordering::Relaxed);
    }

    // Publish stage
    pub fn event_dequeued(&self) {
        self.events_dequeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn routing_failed(&self) {
        self.routing_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_attempt_failed(&self) {
        self.publish_attempt_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_dropped_after_retries(&self) {
        self.events_dropped_after_retries
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_dropped_on_shutdown(&self) {
        self.events_dropped_on_shutdown
            .fetch_add(1, Ordering::Relaxed);
    }

    // Broker connection
    pub fn mqtt_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(true, Ordering::Relaxed);
    }

    pub fn mqtt_connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(false, Ordering::Relaxed);
    }

    pub fn mqtt_connection_lost(&self) {
        self.mqtt_connected.store(false, Ordering::Relaxed);
    }

    // Lifecycle
    pub fn set_bridge_state(&self, state: &str) {
        if let Ok(mut current_state) = self.bridge_state.lock() {
            if *current_state != state {
                self.state_transitions.fetch_add(1, Ordering::Relaxed);
                *current_state = state.to_string();
            }
        }
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let enqueued = self.events_enqueued.load(Ordering::Relaxed);
        let dequeued = self.events_dequeued.load(Ordering::Relaxed);

        MetricsSnapshot {
            ingest: IngestMetrics {
                frames_read: self.frames_read.load(Ordering::Relaxed),
                diagnostic_frames: self.diagnostic_frames.load(Ordering::Relaxed),
                oversized_frames: self.oversized_frames.load(Ordering::Relaxed),
                decode_failures: self.decode_failures.load(Ordering::Relaxed),
                events_enqueued: enqueued,
                serial_errors: self.serial_errors.load(Ordering::Relaxed),
                serial_reopens: self.serial_reopens.load(Ordering::Relaxed),
            },
            publish: PublishMetrics {
                events_dequeued: dequeued,
                queue_depth: enqueued.saturating_sub(dequeued),
                events_published: self.events_published.load(Ordering::Relaxed),
                routing_failures: self.routing_failures.load(Ordering::Relaxed),
                publish_attempt_failures: self.publish_attempt_failures.load(Ordering::Relaxed),
                events_dropped_after_retries: self
                    .events_dropped_after_retries
                    .load(Ordering::Relaxed),
                events_dropped_on_shutdown: self
                    .events_dropped_on_shutdown
                    .load(Ordering::Relaxed),
            },
            mqtt: MqttMetrics {
                connected: self.mqtt_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                state: self
                    .bridge_state
                    .lock()
                    .map(|s| s.clone())
                    .unwrap_or_else(|_| "unknown".to_string()),
                state_transitions: self.state_transitions.load(Ordering::Relaxed),
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            },
            timestamp: now,
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub ingest: IngestMetrics,
    pub publish: PublishMetrics,
    pub mqtt: MqttMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestMetrics {
    pub frames_read: u64,
    pub diagnostic_frames: u64,
    pub oversized_frames: u64,
    pub decode_failures: u64,
    pub events_enqueued: u64,
    pub serial_errors: u64,
    pub serial_reopens: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublishMetrics {
    pub events_dequeued: u64,
    pub queue_depth: u64,
    pub events_published: u64,
    pub routing_failures: u64,
    pub publish_attempt_failures: u64,
    pub events_dropped_after_retries: u64,
    pub events_dropped_on_shutdown: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MqttMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LifecycleMetrics {
    pub state: String,
    pub state_transitions: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Events that left the pipeline without reaching the broker
    pub fn total_dropped_events(&self) -> u64 {
        self.publish.routing_failures
            + self.publish.events_dropped_after_retries
            + self.publish.events_dropped_on_shutdown
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
