//! Transport engine implementations

pub mod webrtc_engine;

pub use webrtc_engine::{WebRtcConnection, WebRtcEngine};
