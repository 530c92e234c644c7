//! meshcall - Full-mesh WebRTC calls for small rooms
//!
//! Every participant keeps one peer connection to every other participant.
//! A lightweight relay forwards the offer/answer/candidate exchange between
//! them; media never passes through it.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
