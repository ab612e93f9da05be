//! Ports: what drives the engine (inbound) and what the engine drives
//! (outbound).

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
