//! Local media implementations

pub mod capture;

pub use capture::{spawn_silence, write_sample, SampleCapture};
