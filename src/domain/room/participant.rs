//! Observer-facing participant entry

use crate::domain::media::RemoteMedia;
use crate::domain::shared::ParticipantId;

/// A remote participant as the view layer sees it
#[derive(Debug, Clone)]
pub struct RemoteParticipant {
    pub participant_id: ParticipantId,
    pub display_label: String,
    /// Absent until the first remote track arrives
    pub remote_media: Option<RemoteMedia>,
}

impl RemoteParticipant {
    pub fn new(participant_id: ParticipantId, display_label: String) -> Self {
        Self {
            participant_id,
            display_label,
            remote_media: None,
        }
    }

    pub fn has_media(&self) -> bool {
        self.remote_media.is_some()
    }
}
