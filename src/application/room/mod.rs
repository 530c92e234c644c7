//! Room use case - one joined room with a full mesh of peer sessions

pub mod handle;
pub mod observer;
pub mod orchestrator;
mod step;

pub use handle::{RoomCommand, RoomHandle};
pub use observer::RoomObserver;
pub use orchestrator::{RoomOrchestrator, RoomPhase, RoomSettings};
