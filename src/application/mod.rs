//! Application layer - Use cases and application services
//!
//! This layer orchestrates domain objects to fulfill use cases.
//! It's responsible for:
//! - Driving per-participant negotiation from signaling traffic
//! - Keeping the peer registry and local media consistent
//! - Publishing room state to observers

pub mod room;

pub use room::{RoomCommand, RoomHandle, RoomObserver, RoomOrchestrator, RoomPhase, RoomSettings};
