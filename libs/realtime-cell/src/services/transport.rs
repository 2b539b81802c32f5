use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::models::{HandleId, RealtimeEvent, SequencedEvent};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("outbound buffer full")]
    Full,
    #[error("transport closed")]
    Closed,
}

/// Where a handle's events end up. Implementations must not block on a slow
/// client: a full buffer is reported, not waited on.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &RealtimeEvent) -> Result<(), DeliveryError>;
    fn is_closed(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Push,
    Polling,
}

/// A live channel through which one identity receives events.
#[derive(Clone)]
pub struct TransportHandle {
    id: HandleId,
    kind: HandleKind,
    sink: Arc<dyn EventSink>,
}

impl TransportHandle {
    pub fn new(kind: HandleKind, sink: Arc<dyn EventSink>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            sink,
        }
    }

    pub fn push(capacity: usize) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (sink, receiver) = PushSink::channel(capacity);
        (Self::new(HandleKind::Push, Arc::new(sink)), receiver)
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }

    pub async fn deliver(&self, event: &RealtimeEvent) -> Result<(), DeliveryError> {
        self.sink.deliver(event).await
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("closed", &self.sink.is_closed())
            .finish()
    }
}

// ==============================================================================
// PUSH (WebSocket writer task drains the receiver)
// ==============================================================================

pub struct PushSink {
    tx: mpsc::Sender<RealtimeEvent>,
}

impl PushSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for PushSink {
    async fn deliver(&self, event: &RealtimeEvent) -> Result<(), DeliveryError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ==============================================================================
// POLLING (server-held queue, drained by GET /signal)
// ==============================================================================

/// Bounded FIFO of events for one recipient. Oldest dropped on overflow.
///
/// Returned events stay queued until a later poll acknowledges them with
/// `since >= seq`, so a lost poll response can be retried.
#[derive(Debug)]
pub struct PollQueue {
    events: VecDeque<SequencedEvent>,
    capacity: usize,
    next_seq: u64,
    // Highest sequence number handed to the client so far.
    cursor: u64,
    dropped: u64,
}

pub struct PollBatch {
    pub events: Vec<SequencedEvent>,
    pub cursor: u64,
    pub dropped: u64,
}

impl PollQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            next_seq: 1,
            cursor: 0,
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: RealtimeEvent) {
        if self.events.len() >= self.capacity {
            if let Some(oldest) = self.events.pop_front() {
                debug!("Poll queue full, dropping {} (seq {})", oldest.event.name(), oldest.seq);
                // Only events the client never saw count as lost.
                if oldest.seq > self.cursor {
                    self.dropped += 1;
                }
            }
        }
        self.events.push_back(SequencedEvent {
            seq: self.next_seq,
            event,
        });
        self.next_seq += 1;
    }

    /// Discards events acknowledged by `since` and returns everything still
    /// queued. Without `since` nothing is acknowledged.
    pub fn take(&mut self, since: Option<u64>) -> PollBatch {
        if let Some(since) = since {
            while self.events.front().map(|e| e.seq <= since).unwrap_or(false) {
                self.events.pop_front();
            }
            self.cursor = self.cursor.max(since.min(self.next_seq - 1));
        }

        let events: Vec<SequencedEvent> = self.events.iter().cloned().collect();
        if let Some(last) = events.last() {
            self.cursor = self.cursor.max(last.seq);
        }

        let dropped = std::mem::take(&mut self.dropped);
        PollBatch {
            events,
            cursor: self.cursor,
            dropped,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub struct PollingSink {
    queue: Arc<Mutex<PollQueue>>,
    closed: AtomicBool,
}

impl PollingSink {
    pub fn new(queue: Arc<Mutex<PollQueue>>) -> Self {
        Self {
            queue,
            closed: AtomicBool::new(false),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventSink for PollingSink {
    async fn deliver(&self, event: &RealtimeEvent) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.queue.lock().await.push(event.clone());
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
