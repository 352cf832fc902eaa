//! Bridge runner: composes the ingest and publish stages
//!
//! The runner owns the frame source and runs the ingest stage in its own
//! task; the publish stage runs in a spawned task that owns the publisher.
//! The transfer queue is the only thing the two share.
//!
//! ```text
//! Starting ──open ok──▶ Running ──shutdown / end of stream / source failed──▶ Draining ──▶ Stopped
//!     └──open failed──────────────────────────────────────────────────────────────────────▶ Stopped
//! ```

use super::ingest::{run_ingest, IngestOutcome};
use super::publish_stage::{run_publish_stage, PublishStageReport};
use crate::backoff::BackoffPolicy;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::observability::{MetricsCollector, MetricsSnapshot};
use crate::publisher::Publisher;
use crate::queue::transfer_queue;
use crate::serial::FrameSource;
use crate::transport::Transport;
use crate::{ingest_span, lifecycle_span};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn, Instrument};

/// Lifecycle state of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl BridgeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Starting => "starting",
            BridgeState::Running => "running",
            BridgeState::Draining => "draining",
            BridgeState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ShutdownRequested,
    EndOfStream,
}

/// Outcome of a run that ended cleanly
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub publish: PublishStageReport,
    pub metrics: MetricsSnapshot,
}

/// Runner settings taken from the configuration
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub queue_capacity: usize,
    pub drain_timeout: Duration,
    pub reopen_policy: BackoffPolicy,
}

impl RunnerSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            queue_capacity: config.pipeline.queue_capacity,
            drain_timeout: config.pipeline.drain_timeout(),
            reopen_policy: config.retry.serial.clone(),
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

pub struct BridgeRunner<S, T>
where
    S: FrameSource,
    T: Transport + 'static,
{
    source: S,
    publisher: Publisher<T>,
    settings: RunnerSettings,
    reporter: StateReporter,
}

impl<S, T> BridgeRunner<S, T>
where
    S: FrameSource,
    T: Transport + 'static,
{
    pub fn new(
        source: S,
        publisher: Publisher<T>,
        settings: RunnerSettings,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let (state_tx, _) = watch::channel(BridgeState::Starting);
        Self {
            source,
            publisher,
            settings,
            reporter: StateReporter { state_tx, metrics },
        }
    }

    /// Watch the runner's state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<BridgeState> {
        self.reporter.state_tx.subscribe()
    }

    pub fn state(&self) -> BridgeState {
        *self.reporter.state_tx.borrow()
    }

    /// Run until shutdown is requested, the source ends, or the source fails
    /// for good
    ///
    /// Setting `shutdown` to true starts draining. Dropping its sender does not.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> BridgeResult<RunSummary> {
        let span = lifecycle_span!(source = %self.source.name());
        self.run_inner(shutdown).instrument(span).await
    }

    async fn run_inner(self, shutdown: watch::Receiver<bool>) -> BridgeResult<RunSummary> {
        let BridgeRunner {
            mut source,
            publisher,
            settings,
            reporter,
        } = self;
        reporter.set_state(BridgeState::Starting);

        let (mut queue_tx, queue_rx) = transfer_queue(settings.queue_capacity)
            .map_err(|e| BridgeError::internal(e.to_string()))?;

        if let Err(e) = source.open().await {
            error!(source = %source.name(), error = %e, "Cannot open frame source");
            reporter.set_state(BridgeState::Stopped);
            return Err(BridgeError::fatal_startup(format!(
                "cannot open frame source {}: {e}",
                source.name()
            )));
        }

        let (drain_tx, drain_rx) = watch::channel(None);
        let publish_handle = tokio::spawn(run_publish_stage(
            publisher,
            queue_rx,
            drain_rx,
            reporter.metrics.clone(),
        ));
        reporter.set_state(BridgeState::Running);

        let ingest = ingest_span!(source = %source.name());
        let outcome = run_ingest(
            &mut source,
            &mut queue_tx,
            &settings.reopen_policy,
            &reporter.metrics,
            shutdown,
        )
        .instrument(ingest)
        .await;
        info!(outcome = ?outcome, "Ingest stage stopped");

        reporter.set_state(BridgeState::Draining);
        queue_tx.close();
        source.close().await;
        let _ = drain_tx.send(Some(Instant::now() + settings.drain_timeout));

        let publish_report = match publish_handle.await {
            Ok(report) => report,
            Err(e) => {
                reporter.set_state(BridgeState::Stopped);
                return Err(BridgeError::internal(format!("publish stage failed: {e}")));
            }
        };
        if publish_report.deadline_exceeded {
            warn!(
                abandoned = publish_report.abandoned,
                "Drain deadline exceeded"
            );
        }
        reporter.set_state(BridgeState::Stopped);

        let metrics = reporter.metrics.snapshot();
        info!(
            published = metrics.publish.events_published,
            dropped = metrics.total_dropped_events(),
            "Bridge stopped"
        );

        let stop_reason = match outcome {
            IngestOutcome::ShutdownRequested => StopReason::ShutdownRequested,
            IngestOutcome::EndOfStream => StopReason::EndOfStream,
            IngestOutcome::SourceFailed {
                attempts,
                last_error,
            } => {
                return Err(BridgeError::SourceFailed {
                    attempts,
                    last_error,
                })
            }
            IngestOutcome::QueueClosed => {
                return Err(BridgeError::internal(
                    "transfer queue closed before the ingest stage finished",
                ))
            }
        };

        Ok(RunSummary {
            stop_reason,
            publish: publish_report,
            metrics,
        })
    }
}

/// Publishes state changes to watchers and the metrics collector
struct StateReporter {
    state_tx: watch::Sender<BridgeState>,
    metrics: Arc<MetricsCollector>,
}

impl StateReporter {
    fn set_state(&self, state: BridgeState) {
        self.state_tx.send_replace(state);
        self.metrics.set_bridge_state(state.as_str());
        info!(state = %state, "Bridge state changed");
    }
}
