//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - The WebSocket signaling client
//! - The WebRTC transport engine
//! - Sample-based local media capture

pub mod media;
pub mod signaling;
pub mod transport;
