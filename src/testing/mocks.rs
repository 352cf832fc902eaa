//! Mock implementations for testing
//!
//! Provides a scripted frame source and an in-memory transport so the
//! bridge can be exercised without a serial device or an MQTT broker.
//! Both mocks share their recorded state through `Arc`s, so a test can keep
//! a clone after handing the mock to the code under test.

use crate::error::SourceError;
use crate::observability::MetricsCollector;
use crate::protocol::RawFrame;
use crate::serial::{next_telemetry_frame, FrameSource, LineFrameReader};
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

pub type PublishedMessage = (String, Bytes);

#[derive(Debug, Error)]
#[error("mock transport failure: {0}")]
pub struct MockTransportError(pub String);

/// Mock transport for testing
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    /// Every connect fails
    pub should_fail: bool,
    connect_failures_remaining: Arc<AtomicU32>,
    publish_failures_remaining: Arc<AtomicU32>,
    publish_delay: Option<Duration>,
    connected: Arc<AtomicBool>,
    connect_calls: Arc<AtomicU32>,
    disconnect_calls: Arc<AtomicU32>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Fail the next `count` connects
    pub fn failing_connects(self, count: u32) -> Self {
        self.connect_failures_remaining
            .store(count, Ordering::SeqCst);
        self
    }

    /// Fail the next `count` publishes; each failure also drops the connection
    pub fn failing_publishes(self, count: u32) -> Self {
        self.publish_failures_remaining
            .store(count, Ordering::SeqCst);
        self
    }

    /// Make every publish take `delay` before it is acknowledged
    pub fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = Some(delay);
        self
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    pub async fn get_published_topics(&self) -> Vec<String> {
        self.published_messages
            .lock()
            .await
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Published payloads parsed back into JSON
    pub async fn get_published_payloads(&self) -> Vec<serde_json::Value> {
        self.published_messages
            .lock()
            .await
            .iter()
            .filter_map(|(_, payload)| serde_json::from_slice(payload).ok())
            .collect()
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Simulate the broker dropping the connection
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail || Self::take_failure(&self.connect_failures_remaining) {
            return Err(MockTransportError("connection refused".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<(), Self::Error> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(MockTransportError("not connected".to_string()));
        }
        if Self::take_failure(&self.publish_failures_remaining) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(MockTransportError("connection reset".to_string()));
        }
        if let Some(delay) = self.publish_delay {
            tokio::time::sleep(delay).await;
        }

        self.published_messages
            .lock()
            .await
            .push((topic.to_string(), payload));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// One step of a [`MockFrameSource`] script
#[derive(Debug, Clone)]
pub enum SourceStep {
    /// Raw serial text, split into lines and filtered like device output
    Data(String),
    /// An I/O error; the source must be reopened afterwards
    Fail(String),
    /// Block forever, like an idle device
    Hang,
}

/// Frame source that replays a script instead of reading a device
///
/// An exhausted script is end of stream.
pub struct MockFrameSource {
    steps: VecDeque<SourceStep>,
    reader: Option<LineFrameReader<Cursor<Vec<u8>>>>,
    is_open: bool,
    open_failures_remaining: u32,
    reopen_failures_remaining: u32,
    max_frame_bytes: usize,
    metrics: Arc<MetricsCollector>,
    pub open_calls: Arc<AtomicU32>,
    pub close_calls: Arc<AtomicU32>,
}

impl MockFrameSource {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            steps: VecDeque::new(),
            reader: None,
            is_open: false,
            open_failures_remaining: 0,
            reopen_failures_remaining: 0,
            max_frame_bytes: 64 * 1024,
            metrics,
            open_calls: Arc::new(AtomicU32::new(0)),
            close_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Append raw serial output; a trailing newline is added when missing
    pub fn data(mut self, text: impl Into<String>) -> Self {
        let mut text = text.into();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        self.steps.push_back(SourceStep::Data(text));
        self
    }

    /// Append one line per item
    pub fn lines<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text: String = lines
            .into_iter()
            .map(|line| format!("{}\n", line.as_ref()))
            .collect();
        self.data(text)
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push_back(SourceStep::Fail(message.into()));
        self
    }

    pub fn hang(mut self) -> Self {
        self.steps.push_back(SourceStep::Hang);
        self
    }

    /// Fail the next `count` opens
    pub fn failing_opens(mut self, count: u32) -> Self {
        self.open_failures_remaining = count;
        self
    }

    /// Let the first open succeed, then fail the next `count` opens
    pub fn failing_reopens(mut self, count: u32) -> Self {
        self.reopen_failures_remaining = count;
        self
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }
}

#[async_trait]
impl FrameSource for MockFrameSource {
    fn name(&self) -> String {
        "mock".to_string()
    }

    async fn open(&mut self) -> Result<(), SourceError> {
        let previous_opens = self.open_calls.fetch_add(1, Ordering::SeqCst);
        let fail = if self.open_failures_remaining > 0 {
            self.open_failures_remaining -= 1;
            true
        } else if previous_opens > 0 && self.reopen_failures_remaining > 0 {
            self.reopen_failures_remaining -= 1;
            true
        } else {
            false
        };
        if fail {
            return Err(SourceError::io(
                "mock",
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such device"),
            ));
        }
        self.is_open = true;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        if !self.is_open {
            return Err(SourceError::NotOpen);
        }

        loop {
            if let Some(reader) = self.reader.as_mut() {
                let frame = next_telemetry_frame(reader, &self.metrics, "mock")
                    .await
                    .map_err(|e| SourceError::io("mock", e))?;
                if let Some(frame) = frame {
                    return Ok(Some(frame));
                }
                self.reader = None;
            }

            match self.steps.pop_front() {
                None => return Ok(None),
                Some(SourceStep::Data(text)) => {
                    self.reader = Some(LineFrameReader::new(
                        Cursor::new(text.into_bytes()),
                        self.max_frame_bytes,
                    ));
                }
                Some(SourceStep::Fail(message)) => {
                    self.is_open = false;
                    return Err(SourceError::io(
                        "mock",
                        std::io::Error::new(std::io::ErrorKind::BrokenPipe, message),
                    ));
                }
                Some(SourceStep::Hang) => {
                    // Keep the step so a reopened source hangs again.
                    self.steps.push_front(SourceStep::Hang);
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    async fn close(&mut self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.is_open = false;
        self.reader = None;
    }
}
