//! Publish stage: transfer queue → publisher

use crate::observability::MetricsCollector;
use crate::publisher::Publisher;
use crate::queue::QueueReceiver;
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Counts reported by the publish stage when it stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishStageReport {
    pub published: u64,
    pub failed: u64,
    /// Items dropped because the drain deadline passed
    pub abandoned: u64,
    pub deadline_exceeded: bool,
}

/// Resolve when the drain deadline, once announced, has passed
async fn drain_deadline(drain_rx: &mut watch::Receiver<Option<Instant>>) {
    loop {
        let deadline = *drain_rx.borrow_and_update();
        if let Some(deadline) = deadline {
            tokio::time::sleep_until(deadline).await;
            return;
        }
        if drain_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Publish queued events in order until the queue is closed and empty
///
/// `drain_rx` carries the drain deadline once the runner starts draining.
/// Past it, the in-flight publish is abandoned and every item still queued
/// is dropped and counted. The publisher is closed on every exit path.
pub async fn run_publish_stage<T: Transport>(
    mut publisher: Publisher<T>,
    mut queue: QueueReceiver,
    mut drain_rx: watch::Receiver<Option<Instant>>,
    metrics: Arc<MetricsCollector>,
) -> PublishStageReport {
    let mut report = PublishStageReport::default();

    loop {
        let item = tokio::select! {
            biased;
            item = queue.dequeue() => item,
            _ = drain_deadline(&mut drain_rx) => {
                report.deadline_exceeded = true;
                break;
            }
        };
        let Some(item) = item else {
            debug!("Transfer queue closed and drained");
            break;
        };
        metrics.event_dequeued();

        tokio::select! {
            biased;
            result = publisher.publish(&item) => match result {
                Ok(_) => report.published += 1,
                // Already logged and counted by the publisher.
                Err(_) => report.failed += 1,
            },
            _ = drain_deadline(&mut drain_rx) => {
                warn!(
                    sequence = item.sequence,
                    "Drain deadline passed during publish; abandoning event"
                );
                metrics.event_dropped_on_shutdown();
                report.abandoned += 1;
                report.deadline_exceeded = true;
                break;
            }
        }
    }

    if report.deadline_exceeded {
        while let Some(item) = queue.try_dequeue() {
            metrics.event_dequeued();
            metrics.event_dropped_on_shutdown();
            report.abandoned += 1;
            debug!(sequence = item.sequence, "Dropping queued event at shutdown");
        }
        if report.abandoned > 0 {
            warn!(dropped = report.abandoned, "Events dropped at the drain deadline");
        }
    }

    publisher.close().await;
    report
}
