//! # Event Subscriber
//!
//! Defines the subscription side of the event bus.

use crate::events::{AssistantEvent, EventFilter};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was dropped.
    #[error("Event bus closed")]
    Closed,
}

/// Anything that hands out subscriptions.
pub trait EventSubscriber: Send + Sync {
    fn subscribe(&self, filter: EventFilter) -> Subscription;
}

impl EventSubscriber for crate::publisher::InMemoryEventBus {
    fn subscribe(&self, filter: EventFilter) -> Subscription {
        crate::publisher::InMemoryEventBus::subscribe(self, filter)
    }
}

/// Decrements the bus's live-subscription count when dropped.
struct SubscriptionGuard(Arc<AtomicUsize>);

impl SubscriptionGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        Self(active)
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
        debug!("Subscription dropped");
    }
}

/// A filtered receiver of assistant events.
pub struct Subscription {
    receiver: broadcast::Receiver<AssistantEvent>,
    filter: EventFilter,
    guard: SubscriptionGuard,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<AssistantEvent>,
        filter: EventFilter,
        active: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            receiver,
            filter,
            guard: SubscriptionGuard::new(active),
        }
    }

    /// Wait for the next matching event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<AssistantEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, events dropped");
                }
            }
        }
    }

    /// Take the next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Result<Option<AssistantEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
            }
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Convert into a `Stream` of matching events.
    #[must_use]
    pub fn into_stream(self) -> EventStream {
        let Self {
            receiver,
            filter,
            guard,
        } = self;
        EventStream {
            inner: BroadcastStream::new(receiver),
            filter,
            _guard: guard,
        }
    }
}

/// `Stream` view over a subscription.
pub struct EventStream {
    inner: BroadcastStream<AssistantEvent>,
    filter: EventFilter,
    _guard: SubscriptionGuard,
}

impl EventStream {
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Stream for EventStream {
    type Item = AssistantEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if self.filter.matches(&event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                    debug!(lagged = count, "Event stream lagged, events dropped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::publisher::InMemoryEventBus;
    use crate::EventPublisher;
    use le_audio_types::{BroadcastId, DeviceAddress, Reason};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    fn lost() -> AssistantEvent {
        AssistantEvent::SourceLost {
            broadcast_id: BroadcastId::new(0x42).unwrap(),
        }
    }

    fn removed(sink: DeviceAddress) -> AssistantEvent {
        AssistantEvent::SourceRemoved {
            sink,
            source_id: 0,
            reason: Reason::RemoteRequest,
        }
    }

    #[tokio::test]
    async fn test_subscription_recv() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        bus.publish(lost()).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(received, lost());
    }

    #[tokio::test]
    async fn test_subscription_filter() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::SourceOperation]));

        bus.publish(lost()).await;
        let sink = DeviceAddress::new([9; 6]);
        bus.publish(removed(sink)).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(received, removed(sink));
    }

    #[tokio::test]
    async fn test_subscription_drop_cleanup() {
        let bus = InMemoryEventBus::new();
        {
            let _sub1 = bus.subscribe(EventFilter::all());
            let _stream = bus.event_stream(EventFilter::all());
            assert_eq!(bus.subscriber_count(), 2);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        assert!(matches!(sub.try_recv(), Ok(None)));

        bus.publish(lost()).await;
        assert_eq!(sub.try_recv(), Ok(Some(lost())));
    }

    #[tokio::test]
    async fn test_try_recv_closed() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        drop(bus);
        assert_eq!(sub.try_recv(), Err(SubscriptionError::Closed));
    }

    #[tokio::test]
    async fn test_event_stream_filters_by_sink() {
        let bus = InMemoryEventBus::new();
        let wanted = DeviceAddress::new([1; 6]);
        let mut stream = bus.event_stream(EventFilter::all().for_sinks(vec![wanted]));

        bus.publish(removed(DeviceAddress::new([2; 6]))).await;
        bus.publish(removed(wanted)).await;

        let next = timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(next, removed(wanted));
    }
}
