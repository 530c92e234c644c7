//! Media bounded context - local outbound tracks and attached remote media

pub mod capture;
pub mod local_state;
pub mod track;

pub use capture::{MediaCapture, MediaConstraints, VideoConstraints};
pub use local_state::{LocalMediaSource, LocalMediaState};
pub use track::{LocalTrack, MediaHandle, RemoteMedia, RemoteTrack, TrackKind};
