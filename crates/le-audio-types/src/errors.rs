//! # Error Types
//!
//! The failure taxonomy reported to applications, and the reason attached to
//! every source-operation callback.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an assistant operation was rejected or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum AssistantError {
    /// The sink device is not connected.
    #[error("sink device is not connected")]
    NotConnected,

    /// The source id does not name a slot on the sink.
    #[error("invalid source id")]
    InvalidSourceId,

    /// The sink already holds this source.
    #[error("source already present on the sink")]
    DuplicateSource,

    /// Another operation on the same key is still awaiting completion.
    #[error("an operation on this source is already pending")]
    OperationAlreadyPending,

    /// Malformed request (bad broadcast code length, invalid broadcast id).
    #[error("bad parameters")]
    BadParameters,

    /// No free slot and nothing that can be evicted.
    #[error("no capacity for another source")]
    NoCapacity,

    /// The scan or transport primitive is unavailable.
    #[error("no backing service")]
    NoBackingService,

    #[error("unknown failure")]
    Unknown,
}

/// Reason attached to a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    /// Requested by a local application.
    LocalAppRequest,
    /// Initiated by the local stack (handover, teardown).
    LocalStackRequest,
    /// Initiated by the remote sink or another assistant.
    RemoteRequest,
    /// Applied by system policy.
    SystemPolicy,
    /// The operation failed.
    Failed(AssistantError),
}

impl Reason {
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// The failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<AssistantError> {
        match self {
            Self::Failed(e) => Some(*e),
            _ => None,
        }
    }
}

impl From<AssistantError> for Reason {
    fn from(error: AssistantError) -> Self {
        Self::Failed(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert!(AssistantError::NotConnected.to_string().contains("not connected"));
        assert!(AssistantError::NoCapacity.to_string().contains("capacity"));
    }

    #[test]
    fn test_reason_success() {
        assert!(Reason::LocalAppRequest.is_success());
        assert!(Reason::RemoteRequest.is_success());
        let failed: Reason = AssistantError::DuplicateSource.into();
        assert!(!failed.is_success());
        assert_eq!(failed.error(), Some(AssistantError::DuplicateSource));
    }
}
