//! Bounded transfer queue between the ingest and publish stages
//!
//! The queue is the only state shared by the two stages. When it is full,
//! [`QueueSender::enqueue`] waits for space rather than dropping events:
//! ingest slows down while the broker is slow, but no decoded telemetry is
//! silently discarded. A drop-oldest queue would keep the serial reader
//! strictly real-time at the cost of losing data; this bridge does not
//! make that trade.

use crate::protocol::DecodedEvent;
use bytes::Bytes;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default number of events buffered between the stages
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// One decoded event, already serialized, waiting to be published
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Monotonic sequence number assigned at enqueue time, starting at 1
    pub sequence: u64,
    /// When the event entered the queue; publish logs report the wait
    pub enqueued_at: Instant,
    pub event: DecodedEvent,
    /// JSON wire form of `event`
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Transfer queue capacity must be greater than 0")]
    ZeroCapacity,
    #[error("Transfer queue is closed")]
    Closed,
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Create a bounded queue, returning its producer and consumer halves
pub fn transfer_queue(capacity: usize) -> Result<(QueueSender, QueueReceiver), QueueError> {
    if capacity == 0 {
        return Err(QueueError::ZeroCapacity);
    }

    let (tx, rx) = mpsc::channel(capacity);
    Ok((
        QueueSender {
            tx: Some(tx),
            next_sequence: 1,
        },
        QueueReceiver { rx },
    ))
}

/// Producer half, owned by the ingest stage
#[derive(Debug)]
pub struct QueueSender {
    tx: Option<mpsc::Sender<QueueItem>>,
    next_sequence: u64,
}

impl QueueSender {
    /// Serialize and enqueue an event, waiting while the queue is full
    ///
    /// Returns the sequence number given to the event.
    pub async fn enqueue(&mut self, event: DecodedEvent) -> Result<u64, QueueError> {
        let tx = self.tx.as_ref().ok_or(QueueError::Closed)?;
        let payload = Bytes::from(event.to_payload()?);

        let sequence = self.next_sequence;
        let item = QueueItem {
            sequence,
            enqueued_at: Instant::now(),
            event,
            payload,
        };

        tx.send(item).await.map_err(|_| QueueError::Closed)?;
        self.next_sequence += 1;
        Ok(sequence)
    }

    /// Signal that no more items will be enqueued; queued items stay available
    pub fn close(&mut self) {
        self.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, mpsc::Sender::is_closed)
    }
}

/// Consumer half, owned by the publish stage
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<QueueItem>,
}

impl QueueReceiver {
    /// Wait for the next item; None once the queue is closed and drained
    pub async fn dequeue(&mut self) -> Option<QueueItem> {
        self.rx.recv().await
    }

    /// Take an item if one is ready, without waiting
    pub fn try_dequeue(&mut self) -> Option<QueueItem> {
        self.rx.try_recv().ok()
    }
}
