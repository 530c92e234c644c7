//! Room bounded context - what the room publishes to its observers

pub mod event;
pub mod participant;

pub use event::RoomEvent;
pub use participant::RemoteParticipant;
