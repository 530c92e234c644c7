//! Signaling channel port

use crate::domain::shared::{ParticipantId, Result};
use crate::domain::signaling::message::SignalingMessage;

/// What the signaling connection delivers to the room loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(SignalingMessage),
    /// The relay connection is gone; no reconnection is attempted
    Disconnected(String),
}

/// Outbound half of a relay connection
///
/// Knows nothing about negotiation. `send` fails with
/// `DomainError::NotConnected` once the connection is down.
pub trait SignalingChannel: Send + Sync {
    /// Identifier the relay knows this connection by
    fn local_id(&self) -> &ParticipantId;

    fn send(&self, message: SignalingMessage) -> Result<()>;

    /// Close the connection; calling it again is harmless
    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}
