//! # Event Publisher
//!
//! Applications receive assistant callbacks through this bus; the runtime
//! publishes them in the order the engine produced them.

use crate::events::{AssistantEvent, EventFilter};
use crate::subscriber::{EventStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing assistant events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event.
    ///
    /// Returns the number of subscribers the event was delivered to.
    async fn publish(&self, event: AssistantEvent) -> usize;

    /// Total number of events published.
    fn events_published(&self) -> u64;
}

/// In-process event bus backed by `tokio::sync::broadcast`.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<AssistantEvent>,
    /// Live `Subscription`/`EventStream` handles.
    active: Arc<AtomicUsize>,
    events_published: AtomicU64,
    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a bus with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with the given per-subscriber buffer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            active: Arc::new(AtomicUsize::new(0)),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, sinks = filter.sinks.len(), "New subscription");
        Subscription::new(self.sender.subscribe(), filter, Arc::clone(&self.active))
    }

    /// Subscribe and wrap the subscription in a `Stream`.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        self.subscribe(filter).into_stream()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: AssistantEvent) -> usize {
        let topic = event.topic();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(topic = ?topic, receivers, "Event published");
                receivers
            }
            Err(_) => {
                // Nobody listening; callbacks are fire-and-forget.
                trace!(topic = ?topic, "Event dropped (no subscribers)");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
