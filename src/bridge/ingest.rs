//! Ingest stage: frame source → decoder → transfer queue

use crate::backoff::{BackoffPolicy, RetryDecision};
use crate::error::SourceError;
use crate::observability::MetricsCollector;
use crate::protocol::decode_frame;
use crate::queue::{QueueError, QueueSender};
use crate::serial::FrameSource;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Why the ingest stage stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    ShutdownRequested,
    /// The source reported end of stream
    EndOfStream,
    /// Reopening the source failed too often
    SourceFailed { attempts: u32, last_error: String },
    /// The publish stage went away
    QueueClosed,
}

enum ReopenOutcome {
    Reopened,
    ShutdownRequested,
    Exhausted { attempts: u32, last_error: String },
}

/// Resolve once shutdown has been requested
///
/// A dropped sender never requests shutdown.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Read, decode and enqueue frames until shutdown, end of stream or a
/// permanent source failure
pub async fn run_ingest<S: FrameSource>(
    source: &mut S,
    queue: &mut QueueSender,
    reopen_policy: &BackoffPolicy,
    metrics: &MetricsCollector,
    mut shutdown: watch::Receiver<bool>,
) -> IngestOutcome {
    loop {
        let next = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => return IngestOutcome::ShutdownRequested,
            next = source.next_frame() => next,
        };

        let frame = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(source = %source.name(), "Frame source reached end of stream");
                return IngestOutcome::EndOfStream;
            }
            Err(e) => {
                metrics.serial_error();
                error!(source = %source.name(), error = %e, "Frame source failed");
                match reopen_source(source, reopen_policy, metrics, &mut shutdown, e).await {
                    ReopenOutcome::Reopened => continue,
                    ReopenOutcome::ShutdownRequested => return IngestOutcome::ShutdownRequested,
                    ReopenOutcome::Exhausted {
                        attempts,
                        last_error,
                    } => {
                        return IngestOutcome::SourceFailed {
                            attempts,
                            last_error,
                        }
                    }
                }
            }
        };

        let event = match decode_frame(&frame) {
            Ok(event) => event,
            Err(e) => {
                metrics.decode_failed();
                warn!(kind = e.kind(), error = %e, frame = %frame, "Dropping undecodable frame");
                continue;
            }
        };

        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => {
                metrics.event_dropped_on_shutdown();
                warn!("Shutdown while waiting for queue space; dropping decoded event");
                return IngestOutcome::ShutdownRequested;
            }
            result = queue.enqueue(event) => match result {
                Ok(sequence) => {
                    metrics.event_enqueued();
                    debug!(sequence, "Event queued");
                }
                Err(QueueError::Serialization(e)) => {
                    metrics.decode_failed();
                    warn!(error = %e, "Dropping event that cannot be serialized");
                }
                Err(e) => {
                    error!(error = %e, "Transfer queue closed under the ingest stage");
                    return IngestOutcome::QueueClosed;
                }
            }
        }
    }
}

async fn reopen_source<S: FrameSource>(
    source: &mut S,
    policy: &BackoffPolicy,
    metrics: &MetricsCollector,
    shutdown: &mut watch::Receiver<bool>,
    error: SourceError,
) -> ReopenOutcome {
    source.close().await;

    let mut failed_attempts = 0u32;
    let mut last_error = error.to_string();

    loop {
        let shutdown_requested = *shutdown.borrow();
        match policy.next_attempt(failed_attempts, shutdown_requested) {
            RetryDecision::Proceed { attempt, delay } => {
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Reopening frame source after delay"
                );
                if !interruptible_sleep(shutdown, delay).await {
                    return ReopenOutcome::ShutdownRequested;
                }

                match source.open().await {
                    Ok(()) => {
                        metrics.serial_reopened();
                        info!(attempt, source = %source.name(), "Frame source reopened");
                        return ReopenOutcome::Reopened;
                    }
                    Err(e) => {
                        failed_attempts += 1;
                        metrics.serial_error();
                        last_error = e.to_string();
                    }
                }
            }
            RetryDecision::AbortShutdownRequested => return ReopenOutcome::ShutdownRequested,
            RetryDecision::AbortMaxAttemptsExceeded => {
                error!(
                    attempts = failed_attempts,
                    error = %last_error,
                    "Giving up on frame source"
                );
                return ReopenOutcome::Exhausted {
                    attempts: failed_attempts,
                    last_error,
                };
            }
        }
    }
}

/// Sleep unless shutdown comes first; false when interrupted
async fn interruptible_sleep(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = wait_for_shutdown(shutdown) => {
            info!("Shutdown signal received during reopen delay");
            false
        }
        _ = tokio::time::sleep(delay) => true,
    }
}
