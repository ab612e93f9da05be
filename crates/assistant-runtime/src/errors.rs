//! Runtime error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The actor has stopped and no longer accepts commands.
    #[error("assistant runtime is not running")]
    ChannelClosed,

    /// The command queue is full; only reported by non-blocking sends.
    #[error("command queue full, dropped {0}")]
    QueueFull(&'static str),

    /// The actor stopped before answering a query.
    #[error("assistant runtime dropped the reply")]
    ReplyDropped,

    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("assistant actor failed: {0}")]
    Join(String),
}
