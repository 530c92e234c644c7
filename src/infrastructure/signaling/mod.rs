//! Signaling client implementations

pub mod client;

pub use client::WebSocketSignalingClient;
