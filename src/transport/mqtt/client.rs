//! Impure I/O operations for the MQTT client
//!
//! Owns the `rumqttc` client and the task that polls its event loop. The
//! task never reconnects on its own: it stops on the first connection error
//! and leaves reconnection to the caller.

use super::connection::{
    configure_mqtt_options, ConnectionState, MqttError, REQUEST_CHANNEL_CAPACITY,
};
use super::message_handler::{route_mqtt_event, EventRoute};
use crate::config::MqttSection;
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, EventLoop, QoS};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long `disconnect` waits for the event loop task to flush and stop
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Resolve the broker address before the bridge starts
///
/// An unresolvable host is a startup error, unlike a broker that is merely
/// down, which the publisher retries.
pub async fn resolve_broker(host: &str, port: u16) -> Result<Vec<SocketAddr>, MqttError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| MqttError::Resolve {
            host: host.to_string(),
            reason: e.to_string(),
        })?
        .collect();

    if addrs.is_empty() {
        return Err(MqttError::Resolve {
            host: host.to_string(),
            reason: "no addresses found".to_string(),
        });
    }
    Ok(addrs)
}

/// Progress of QoS 1 publishes as seen by the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublishProgress {
    /// A PUBLISH left with this packet id
    Sent(u16),
    /// The broker acknowledged this packet id
    Acked(u16),
}

/// Wait for the PubAck that answers the next PUBLISH sent
///
/// Acks for packet ids other than the one just sent belong to abandoned
/// attempts and are skipped. Returns `None` once the event loop is gone.
async fn await_matching_ack(
    progress_rx: &mut mpsc::UnboundedReceiver<PublishProgress>,
) -> Option<u16> {
    let mut sent = None;
    while let Some(progress) = progress_rx.recv().await {
        match (progress, sent) {
            (PublishProgress::Sent(pkid), None) => sent = Some(pkid),
            (PublishProgress::Acked(pkid), Some(expected)) if pkid == expected => {
                return Some(pkid);
            }
            (other, _) => debug!(?other, ?sent, "Ignoring PubAck for an earlier publish"),
        }
    }
    None
}

/// MQTT 3.1.1 publishing client
pub struct MqttClient {
    config: MqttSection,
    client: Option<AsyncClient>,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: Option<watch::Sender<bool>>,
    progress_rx: Option<mpsc::UnboundedReceiver<PublishProgress>>,
}

impl MqttClient {
    pub fn new(config: MqttSection) -> Self {
        let (_, state_rx) = watch::channel(ConnectionState::Disconnected(
            "Not connected yet".to_string(),
        ));
        Self {
            config,
            client: None,
            event_loop_handle: None,
            state_rx,
            shutdown_tx: None,
            progress_rx: None,
        }
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                let current = state_rx.borrow_and_update().clone();
                match current {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(MqttError::ConnectionFailed(reason));
                    }
                    ConnectionState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailed(
                        "State channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectTimeout { timeout }),
        }
    }

    /// Poll the event loop until the connection ends or shutdown is signalled
    async fn run_event_loop(
        mut event_loop: EventLoop,
        state_tx: watch::Sender<ConnectionState>,
        progress_tx: mpsc::UnboundedSender<PublishProgress>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("Shutdown signal received, stopping MQTT event loop");
                        break;
                    }
                }

                event_result = event_loop.poll() => {
                    let event = match event_result {
                        Ok(event) => event,
                        Err(e) => {
                            error!(error = %e, "MQTT event loop error");
                            let _ = state_tx.send(ConnectionState::Disconnected(e.to_string()));
                            break;
                        }
                    };

                    match route_mqtt_event(&event) {
                        EventRoute::ConnectionAcknowledged => {
                            info!("MQTT connection acknowledged");
                            let _ = state_tx.send(ConnectionState::Connected);
                        }
                        EventRoute::ConnectionRefused(code) => {
                            error!(code = %code, "MQTT connection refused");
                            let _ = state_tx.send(ConnectionState::Disconnected(format!(
                                "Connection refused: {code}"
                            )));
                            break;
                        }
                        EventRoute::PublishSent { pkid } => {
                            let _ = progress_tx.send(PublishProgress::Sent(pkid));
                        }
                        EventRoute::PublishAcknowledged { pkid } => {
                            let _ = progress_tx.send(PublishProgress::Acked(pkid));
                        }
                        EventRoute::Disconnected => {
                            warn!("Broker closed the MQTT session");
                            let _ = state_tx.send(ConnectionState::Disconnected(
                                "Broker sent DISCONNECT".to_string(),
                            ));
                            break;
                        }
                        EventRoute::DisconnectSent => {
                            let _ = state_tx.send(ConnectionState::Disconnected(
                                "Client disconnected".to_string(),
                            ));
                            break;
                        }
                        EventRoute::Infrastructure(packet) => {
                            debug!(packet = %packet, "MQTT infrastructure event");
                        }
                        EventRoute::Outgoing => {}
                    }
                }
            }
        }
        debug!("MQTT event loop stopped");
    }

    /// Stop the event loop task of a previous connection, if any
    fn stop_event_loop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
        self.client = None;
        self.progress_rx = None;
    }

    /// Connect to the broker and wait for its ConnAck
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        if self.connection_state().is_connected() {
            return Ok(());
        }
        self.stop_event_loop();

        let mqtt_options = configure_mqtt_options(&self.config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();

        info!(
            host = %self.config.host,
            port = self.config.port,
            tls = self.config.uses_tls(),
            "Connecting to MQTT broker"
        );
        let handle = tokio::spawn(Self::run_event_loop(
            event_loop,
            state_tx,
            progress_tx,
            shutdown_rx,
        ));

        self.client = Some(client);
        self.event_loop_handle = Some(handle);
        self.state_rx = state_rx.clone();
        self.shutdown_tx = Some(shutdown_tx);
        self.progress_rx = Some(progress_rx);

        if let Err(e) =
            Self::wait_for_connection_confirmation(state_rx, self.config.connect_timeout()).await
        {
            self.stop_event_loop();
            return Err(e);
        }
        Ok(())
    }

    /// Publish with QoS 1, not retained, and wait for the PubAck
    pub async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<(), MqttError> {
        let state = self.connection_state();
        let (Some(client), Some(progress_rx)) = (self.client.as_ref(), self.progress_rx.as_mut())
        else {
            return Err(MqttError::NotConnected { state });
        };
        if !state.is_connected() {
            return Err(MqttError::NotConnected { state });
        }

        // Only one publish is in flight at a time; anything left over belongs to
        // an abandoned attempt.
        while progress_rx.try_recv().is_ok() {}

        client
            .publish_bytes(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(e.to_string()))?;

        let timeout = self.config.ack_timeout();
        match tokio::time::timeout(timeout, await_matching_ack(progress_rx)).await {
            Ok(Some(pkid)) => {
                debug!(topic = %topic, pkid, "PubAck received");
                Ok(())
            }
            Ok(None) => Err(MqttError::ConnectionLost(
                match self.connection_state() {
                    ConnectionState::Disconnected(reason) => reason,
                    other => format!("{other:?}"),
                },
            )),
            Err(_) => Err(MqttError::AckTimeout { timeout }),
        }
    }

    /// Send DISCONNECT and wait (bounded) for the event loop task to stop
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        if !self.connection_state().is_connected() {
            // The event loop already ended; there is no session to close.
            self.stop_event_loop();
            return Ok(());
        }

        let request = client.disconnect().await;
        if let Err(e) = &request {
            warn!(error = %e, "Failed to queue MQTT DISCONNECT");
        }

        if let Some(mut handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await {
                Ok(Ok(())) => debug!("Event loop task shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!(error = %e, "Event loop task ended with error");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!("Event loop task didn't shut down gracefully, forcing abort");
                    handle.abort();
                }
            }
        }
        self.stop_event_loop();

        info!("MQTT client disconnected");
        request.map_err(|e| MqttError::ConnectionFailed(e.to_string()))
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<(), Self::Error> {
        MqttClient::publish(self, topic, payload).await
    }

    fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // No async in Drop; callers disconnect explicitly for a clean DISCONNECT.
        self.stop_event_loop();
    }
}
