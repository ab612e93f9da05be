//! # LE Audio Types Crate
//!
//! Types shared by every crate of the broadcast assistant: device and
//! broadcast identifiers, the metadata that describes a broadcast source,
//! the receive-state slots a sink device reports, and the failure taxonomy
//! surfaced to applications.
//!
//! ## Design Principles
//!
//! - **Absence over sentinels**: unknown values are `Option::None`. The only
//!   sentinels kept are the ones that exist on the wire (`BroadcastId::INVALID`
//!   and the empty slot address `00:00:00:00:00:00`).
//! - **Serializable**: every type crossing the event bus derives serde.

pub mod errors;
pub mod identifiers;
pub mod metadata;
pub mod receive_state;

pub use errors::*;
pub use identifiers::*;
pub use metadata::*;
pub use receive_state::*;
