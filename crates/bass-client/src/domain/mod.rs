//! # Domain Layer
//!
//! Pure state and rules of the assistant. No I/O: everything that touches a
//! radio, a sink or a timer goes through the ports.

pub mod announcement;
pub mod catalog;
pub mod entities;
pub mod handover;
pub mod invariants;
pub mod sink_coordinator;
pub mod sync_queue;
pub mod value_objects;

pub use announcement::*;
pub use catalog::*;
pub use entities::*;
pub use handover::*;
pub use invariants::*;
pub use sink_coordinator::*;
pub use sync_queue::*;
pub use value_objects::*;
