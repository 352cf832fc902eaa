//! Publisher: delivers queued events to the broker
//!
//! Owns the broker connection through a [`Transport`]. Connects lazily on the
//! first publish and again after the connection is lost. Each event gets
//! its own bounded retry budget; an event that exhausts it is dropped and
//! counted once, and the publisher moves on to the next one.

use crate::backoff::{BackoffPolicy, RetryDecision};
use crate::config::BridgeConfig;
use crate::error::PublishError;
use crate::observability::MetricsCollector;
use crate::protocol::topic_for_event;
use crate::publish_span;
use crate::queue::QueueItem;
use crate::transport::mqtt::ConnectionState;
use crate::transport::Transport;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Confirmation that the broker accepted an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub sequence: u64,
    pub topic: String,
    /// Attempts it took, 1 when the first one succeeded
    pub attempts: u32,
}

pub struct Publisher<T: Transport> {
    transport: T,
    state: ConnectionState,
    retry: BackoffPolicy,
    topic_prefix: String,
    metrics: Arc<MetricsCollector>,
    closed: bool,
}

impl<T: Transport> Publisher<T> {
    pub fn new(
        transport: T,
        retry: BackoffPolicy,
        topic_prefix: impl Into<String>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected("Not connected yet".to_string()),
            retry,
            topic_prefix: topic_prefix.into(),
            metrics,
            closed: false,
        }
    }

    pub fn from_config(
        transport: T,
        config: &BridgeConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self::new(
            transport,
            config.retry.publish.clone(),
            config.mqtt.topic_prefix.clone(),
            metrics,
        )
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Publish one queued event, retrying transient failures
    pub async fn publish(&mut self, item: &QueueItem) -> Result<PublishAck, PublishError> {
        if self.closed {
            return Err(PublishError::Closed);
        }

        let topic = match topic_for_event(&item.event, &self.topic_prefix) {
            Ok(topic) => topic,
            Err(e) => {
                self.metrics.routing_failed();
                let dropped = PublishError::routing(e.to_string());
                error!(
                    sequence = item.sequence,
                    kind = dropped.kind(),
                    error = %dropped,
                    "Dropping event that cannot be routed to a topic"
                );
                return Err(dropped);
            }
        };

        let span = publish_span!(sequence = item.sequence, topic = %topic);
        self.publish_with_retry(item, topic).instrument(span).await
    }

    async fn publish_with_retry(
        &mut self,
        item: &QueueItem,
        topic: String,
    ) -> Result<PublishAck, PublishError> {
        let mut failed_attempts = 0u32;

        loop {
            let error = match self.attempt(&topic, item.payload.clone()).await {
                Ok(()) => {
                    self.metrics.event_published();
                    debug!(
                        attempts = failed_attempts + 1,
                        bytes = item.payload.len(),
                        queue_wait_ms = item.enqueued_at.elapsed().as_millis() as u64,
                        "Event published"
                    );
                    return Ok(PublishAck {
                        sequence: item.sequence,
                        topic,
                        attempts: failed_attempts + 1,
                    });
                }
                Err(error) => error,
            };

            failed_attempts += 1;
            self.metrics.publish_attempt_failed();

            match self.retry.next_attempt(failed_attempts, false) {
                RetryDecision::Proceed { attempt, delay } => {
                    warn!(
                        failed_attempts,
                        next_attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Publish attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::AbortShutdownRequested | RetryDecision::AbortMaxAttemptsExceeded => {
                    self.metrics.event_dropped_after_retries();
                    let dropped = PublishError::RetriesExhausted {
                        attempts: failed_attempts,
                        last_error: error,
                    };
                    error!(
                        attempts = failed_attempts,
                        kind = dropped.kind(),
                        error = %dropped,
                        "Dropping event after exhausting publish retries"
                    );
                    return Err(dropped);
                }
            }
        }
    }

    /// One connect-if-needed plus publish attempt
    async fn attempt(&mut self, topic: &str, payload: Bytes) -> Result<(), String> {
        self.ensure_connected().await?;

        if let Err(e) = self.transport.publish(topic, payload).await {
            self.observe_connection();
            return Err(e.to_string());
        }
        Ok(())
    }

    async fn ensure_connected(&mut self) -> Result<(), String> {
        self.observe_connection();
        if self.state.is_connected() {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        self.metrics.mqtt_connection_attempt();

        match self.transport.connect().await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.metrics.mqtt_connection_established();
                info!("Broker connection established");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                self.state = ConnectionState::Disconnected(reason.clone());
                self.metrics.mqtt_connection_failed();
                warn!(error = %reason, "Broker connection failed");
                Err(reason)
            }
        }
    }

    /// Notice a connection that dropped since the last look
    fn observe_connection(&mut self) {
        if self.state.is_connected() && !self.transport.is_connected() {
            self.state = ConnectionState::Disconnected("Connection lost".to_string());
            self.metrics.mqtt_connection_lost();
            warn!("Broker connection lost");
        }
    }

    /// Disconnect from the broker; later calls do nothing
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if self.transport.is_connected() {
            if let Err(e) = self.transport.disconnect().await {
                warn!(error = %e, "Error while disconnecting from broker");
            }
        }
        self.state = ConnectionState::Disconnected("Publisher closed".to_string());
        self.metrics.mqtt_connection_lost();
        info!("Publisher closed");
    }
}
