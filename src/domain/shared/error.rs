//! Domain errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Local media could not be obtained. Fatal to joining, not to the process.
    #[error("Capture failure: {0}")]
    CaptureFailure(String),

    /// The transport connection for one participant could not be built.
    #[error("Connection setup failed for {participant}: {reason}")]
    ConnectionSetupFailure { participant: String, reason: String },

    /// A description or candidate could not be built or applied for one participant.
    #[error("Negotiation failed for {participant}: {reason}")]
    NegotiationFailure { participant: String, reason: String },

    #[error("Signaling disconnected: {0}")]
    SignalingDisconnected(String),

    #[error("Signaling channel is not connected")]
    NotConnected,

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn connection_setup(participant: impl ToString, reason: impl ToString) -> Self {
        Self::ConnectionSetupFailure {
            participant: participant.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn negotiation(participant: impl ToString, reason: impl ToString) -> Self {
        Self::NegotiationFailure {
            participant: participant.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failure is scoped to a single peer session.
    pub fn is_peer_scoped(&self) -> bool {
        matches!(
            self,
            DomainError::ConnectionSetupFailure { .. } | DomainError::NegotiationFailure { .. }
        )
    }
}
