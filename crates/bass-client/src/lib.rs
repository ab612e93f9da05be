//! # Broadcast Assistant Engine
//!
//! Discovers LE Audio broadcast sources, keeps a bounded set of periodic
//! syncs alive to read their BASE, and drives add/modify/remove of sources
//! on connected sink devices, one at a time or across a coordinated set.
//!
//! ## Architecture
//!
//! ```text
//! scan results ──→ ┐                                  ┌──→ SinkTransport
//! sync events  ──→ │                                  ├──→ PeriodicSyncScanner
//! sink events  ──→ ├──→ AssistantService ─────────────┼──→ GroupDirectory
//! app requests ──→ │    [catalog | sync queue |       ├──→ LocalAudioGateway
//! local audio  ──→ │     sinks | handover gate]       └──→ TimerScheduler
//! timers       ──→ ┘            │
//!                               ↓
//!                      AssistantEvent outbox
//! ```
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Description |
//! |----|-----------|-------------|
//! | 1 | Sync Capacity | Never more live syncs than configured |
//! | 2 | Single Claim | At most one sync registration in flight |
//! | 3 | Unique Source | A sink never holds the same broadcast twice |
//! | 4 | Live Bindings | Every bound handle is an active sync |
//! | 5 | One Op Per Key | One pending operation per (kind, key) on a sink |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Pure domain logic (catalog, admission queue, sinks, gate)
//! - `ports/` - Port traits (inbound API and event handlers, outbound SPI)
//! - `service.rs` - Application service implementing every inbound port
//! - `config.rs` - Tunables
//!
//! ## Usage
//!
//! ```ignore
//! use bass_client::{AssistantConfig, AssistantService, BroadcastAssistantApi};
//!
//! let mut service = AssistantService::new(
//!     AssistantConfig::default(),
//!     transport, scanner, groups, local_audio, timers,
//! );
//! service.start_searching(Vec::new());
//! for event in service.take_events() {
//!     bus.publish(event).await;
//! }
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use config::{AssistantConfig, ConfigError};
pub use domain::{
    BroadcastState, LocalStreamStatus, PaSyncRequest, ScanFilter, ScanResult, SyncClaim,
    TimerId, TimerKind,
};
pub use ports::inbound::{
    BroadcastAssistantApi, LocalAudioEventHandler, ScanEventHandler, SinkEventHandler,
    TimerEventHandler,
};
pub use ports::outbound::{
    GroupDirectory, LocalAudioGateway, PeriodicSyncScanner, ScanError, SinkTransport,
    TimerScheduler, TransportError,
};
pub use service::{AssistantService, AssistantStats};
