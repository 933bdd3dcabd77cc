use async_trait::async_trait;
use common::error::diagnostics::DiagnosticMessage;
use common::types::JobKind;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue closed: {context}")]
    Closed { context: DiagnosticMessage },
    #[error("unknown queue: {context}")]
    UnknownQueue { context: DiagnosticMessage },
}

impl QueueError {
    #[track_caller]
    pub fn closed(message: impl Into<String>) -> Self {
        Self::Closed {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn unknown_queue(message: impl Into<String>) -> Self {
        Self::UnknownQueue {
            context: DiagnosticMessage::new(message.into()),
        }
    }
}

/// A received message. Settling consumes it so it can only be settled once.
#[async_trait]
pub trait Delivery: Send {
    fn payload(&self) -> &[u8];
    fn redelivered(&self) -> bool;
    async fn ack(self: Box<Self>) -> Result<(), QueueError>;
    /// Hands the message back to the broker for later redelivery.
    async fn nack(self: Box<Self>) -> Result<(), QueueError>;
}

#[async_trait]
pub trait JobSource: Send + Sync {
    /// Waits for the next message on `queue`; `None` once the source is closed.
    async fn next(&self, queue: &str) -> Result<Option<Box<dyn Delivery>>, QueueError>;
}

/// Names of the parallel shards serving each job kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    shard_count: u32,
    suffix: String,
}

impl QueueTopology {
    pub fn new(shard_count: u32, suffix: impl Into<String>) -> Self {
        Self {
            shard_count: shard_count.max(1),
            suffix: suffix.into(),
        }
    }

    pub fn queue_name(&self, kind: JobKind, shard: u32) -> String {
        format!("{}-{}{}", kind.as_str(), shard, self.suffix)
    }

    pub fn queue_names(&self, kind: JobKind) -> Vec<String> {
        (1..=self.shard_count)
            .map(|shard| self.queue_name(kind, shard))
            .collect()
    }

    pub fn all_queues(&self) -> Vec<(JobKind, String)> {
        JobKind::ALL
            .iter()
            .flat_map(|kind| {
                self.queue_names(*kind)
                    .into_iter()
                    .map(move |name| (*kind, name))
            })
            .collect()
    }

    /// Shard chosen uniformly at random, as publishers do.
    pub fn pick(&self, kind: JobKind) -> String {
        let shard = rand::thread_rng().gen_range(1..=self.shard_count);
        self.queue_name(kind, shard)
    }
}

#[derive(Default)]
struct BrokerState {
    queues: Mutex<HashMap<String, VecDeque<(Vec<u8>, bool)>>>,
    notify: Notify,
    closed: AtomicBool,
    acks: AtomicUsize,
    nacks: AtomicUsize,
}

impl BrokerState {
    fn push(&self, queue: &str, payload: Vec<u8>, redelivered: bool) {
        self.queues
            .lock()
            .entry(queue.to_string())
            .or_default()
            .push_back((payload, redelivered));
        self.notify.notify_waiters();
    }
}

/// In-process broker with at-least-once delivery semantics.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, queue: &str, payload: impl Into<Vec<u8>>) -> Result<(), QueueError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(QueueError::closed(format!("cannot publish to {queue}")));
        }
        self.state.push(queue, payload.into(), false);
        Ok(())
    }

    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn pending(&self, queue: &str) -> usize {
        self.state.queues.lock().get(queue).map_or(0, VecDeque::len)
    }

    pub fn ack_count(&self) -> usize {
        self.state.acks.load(Ordering::SeqCst)
    }

    pub fn nack_count(&self) -> usize {
        self.state.nacks.load(Ordering::SeqCst)
    }

    fn pop(&self, queue: &str) -> Option<MemoryDelivery> {
        let (payload, redelivered) = self.state.queues.lock().get_mut(queue)?.pop_front()?;
        Some(MemoryDelivery {
            state: Arc::clone(&self.state),
            queue: queue.to_string(),
            payload,
            redelivered,
        })
    }
}

#[async_trait]
impl JobSource for MemoryBroker {
    async fn next(&self, queue: &str) -> Result<Option<Box<dyn Delivery>>, QueueError> {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.pop(queue) {
                return Ok(Some(Box::new(delivery)));
            }
            if self.state.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            notified.await;
        }
    }
}

struct MemoryDelivery {
    state: Arc<BrokerState>,
    queue: String,
    payload: Vec<u8>,
    redelivered: bool,
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        self.state.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<(), QueueError> {
        self.state.nacks.fetch_add(1, Ordering::SeqCst);
        let MemoryDelivery {
            state,
            queue,
            payload,
            ..
        } = *self;
        state.push(&queue, payload, true);
        Ok(())
    }
}
