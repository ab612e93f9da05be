//! # Assistant Bus - Application Callback Stream
//!
//! Everything the broadcast assistant reports to applications (search
//! progress, discovered sources, per-sink operation outcomes, receive-state
//! changes) is published here as an [`AssistantEvent`].
//!
//! ```text
//! ┌──────────────────┐                     ┌──────────────┐
//! │ assistant-runtime│     publish()       │ application  │
//! │  (serial actor)  │ ──────┐             │              │
//! └──────────────────┘       │             └──────────────┘
//!                            ▼                    ↑
//!                     ┌──────────────┐            │
//!                     │  Event Bus   │ ───────────┘
//!                     └──────────────┘  subscribe(filter)
//! ```
//!
//! Subscribers filter by [`EventTopic`] and by sink device. A slow subscriber
//! lags and loses the oldest events rather than stalling the engine.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{AssistantEvent, EventFilter, EventTopic};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, EventSubscriber, Subscription, SubscriptionError};

/// Maximum events buffered per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 256);
    }
}
