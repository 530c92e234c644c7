//! Signaling bounded context - relay wire protocol and channel port

pub mod channel;
pub mod message;

pub use channel::{InboundEvent, SignalingChannel};
pub use message::{ParticipantInfo, SignalingMessage};
