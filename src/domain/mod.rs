//! Domain layer - Core negotiation model and the ports it drives
//!
//! This layer contains:
//! - Peer sessions and their negotiation state machine
//! - The peer registry
//! - Local and remote media value objects
//! - The signaling wire protocol
//! - Ports for signaling, media capture and the transport engine

pub mod media;
pub mod room;
pub mod session;
pub mod shared;
pub mod signaling;
pub mod transport;

// Re-export commonly used types
pub use shared::{DomainError, Result};
