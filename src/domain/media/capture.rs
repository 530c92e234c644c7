//! Local media capture port

use crate::domain::media::local_state::LocalMediaSource;
use crate::domain::shared::Result;
use serde::{Deserialize, Serialize};

/// Requested video geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
}

/// What to capture when joining a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: Option<VideoConstraints>,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints {
                width: 480,
                height: 480,
            }),
        }
    }
}

/// Media capture collaborator
///
/// Failures are reported as `DomainError::CaptureFailure`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MediaCapture: Send + Sync {
    async fn capture(&self, constraints: &MediaConstraints) -> Result<LocalMediaSource>;
}
