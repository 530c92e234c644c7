//! Room notifications

use crate::domain::media::TrackKind;
use crate::domain::shared::{DomainError, ParticipantId, RoomId};
use crate::domain::transport::ConnectionState;

/// Connectivity and error notifications published by the room
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Joined {
        room: RoomId,
        participant_id: ParticipantId,
    },
    ParticipantJoined {
        participant_id: ParticipantId,
        display_label: String,
    },
    MediaAttached {
        participant_id: ParticipantId,
        stream_id: String,
    },
    /// Negotiation with the participant completed
    PeerConnected {
        participant_id: ParticipantId,
    },
    ConnectionStateChanged {
        participant_id: ParticipantId,
        state: ConnectionState,
    },
    /// A failure contained to one participant; the rest of the room is unaffected
    PeerFailed {
        participant_id: ParticipantId,
        error: DomainError,
    },
    ParticipantLeft {
        participant_id: ParticipantId,
    },
    LocalMediaChanged {
        kind: TrackKind,
        enabled: bool,
    },
    SignalingDisconnected {
        reason: String,
    },
    /// User-visible message, e.g. no camera access
    Error {
        message: String,
    },
    Left,
}

impl RoomEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            RoomEvent::Joined { .. } => "room.joined",
            RoomEvent::ParticipantJoined { .. } => "participant.joined",
            RoomEvent::MediaAttached { .. } => "participant.media_attached",
            RoomEvent::PeerConnected { .. } => "peer.connected",
            RoomEvent::ConnectionStateChanged { .. } => "peer.connection_state",
            RoomEvent::PeerFailed { .. } => "peer.failed",
            RoomEvent::ParticipantLeft { .. } => "participant.left",
            RoomEvent::LocalMediaChanged { .. } => "media.local_changed",
            RoomEvent::SignalingDisconnected { .. } => "signaling.disconnected",
            RoomEvent::Error { .. } => "room.error",
            RoomEvent::Left => "room.left",
        }
    }
}
