use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

/// Anything published on a stream can report a short kind label for stats
pub trait EventKind {
    fn kind(&self) -> &'static str;
}

/// Generic event stream with a bounded replay buffer
pub struct EventStream<T: Clone + Send + Sync + EventKind + 'static> {
    sender: broadcast::Sender<T>,
    buffer: Arc<RwLock<VecDeque<T>>>,
    buffer_size: usize,
    stats: Arc<RwLock<EventStreamStats>>,
}

/// Statistics for monitoring stream activity
#[derive(Debug, Clone, Default)]
pub struct EventStreamStats {
    pub events_published: u64,
    /// Events that reached no live subscriber (still buffered for replay)
    pub events_unobserved: u64,
    pub type_counts: HashMap<String, u64>,
}

impl<T: Clone + Send + Sync + EventKind + 'static> EventStream<T> {
    /// Create a new event stream with specified capacity
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        debug!(capacity, buffer_size, "Creating new event stream");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(buffer_size))),
            buffer_size,
            stats: Arc::new(RwLock::new(EventStreamStats::default())),
        }
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> Subscriber<T> {
        debug!("New subscriber registered to event stream");
        Subscriber {
            receiver: self.sender.subscribe(),
            buffer: Arc::clone(&self.buffer),
        }
    }

    /// Publish an event to all subscribers, returning how many received it.
    ///
    /// Having no subscribers is normal (nobody is watching the session yet),
    /// so it is counted rather than reported as an error.
    pub async fn publish(&self, event: T) -> usize {
        let kind = event.kind();
        let delivered = self.sender.send(event.clone()).unwrap_or(0);

        self.buffer_event(event).await;

        let mut stats = self.stats.write().await;
        stats.events_published += 1;
        if delivered == 0 {
            stats.events_unobserved += 1;
        }
        *stats.type_counts.entry(kind.to_string()).or_insert(0) += 1;

        trace!(kind, receivers = delivered, "Event published");
        delivered
    }

    /// Store an event in the buffer for replay
    async fn buffer_event(&self, event: T) {
        let mut buffer = self.buffer.write().await;
        buffer.push_back(event);

        while buffer.len() > self.buffer_size {
            buffer.pop_front();
        }
    }

    /// Get current statistics
    pub async fn get_stats(&self) -> EventStreamStats {
        self.stats.read().await.clone()
    }

    /// Reset statistics counters
    pub async fn reset_stats(&self) {
        *self.stats.write().await = EventStreamStats::default();
        debug!("Event stream statistics reset to defaults");
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.buffer_size
    }
}

/// Subscriber for receiving events from a stream
pub struct Subscriber<T: Clone + Send + Sync + 'static> {
    receiver: broadcast::Receiver<T>,
    buffer: Arc<RwLock<VecDeque<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Subscriber<T> {
    /// Receive the next event
    pub async fn recv(&mut self) -> Result<T, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Receive an event only if one is already queued
    pub fn try_recv(&mut self) -> Result<T, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Replay events from the buffer
    pub async fn replay_buffer(&self) -> Vec<T> {
        let buffer = self.buffer.read().await;
        buffer.iter().cloned().collect()
    }
}

impl<T: Clone + Send + Sync + EventKind + 'static> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            buffer: Arc::clone(&self.buffer),
            buffer_size: self.buffer_size,
            stats: Arc::clone(&self.stats),
        }
    }
}
