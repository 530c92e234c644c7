//! Signaling wire messages
//!
//! JSON text frames of the form `{"type": <name>, ...payload}`. Outbound
//! variants are what a client sends to the relay; the relay forwards them
//! to the addressee as the matching `get*` variant.

use crate::domain::session::{IceCandidate, SessionDescription};
use crate::domain::shared::{DomainError, ParticipantId, Result};
use serde::{Deserialize, Serialize};

/// Room member as listed in a membership snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    pub display_label: String,
}

/// Signaling message types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalingMessage {
    /// Request to join a room
    #[serde(rename = "join_room", rename_all = "camelCase")]
    JoinRoom { room: String, display_label: String },

    /// Participants already in the room at join time
    #[serde(rename = "all_users")]
    AllUsers { users: Vec<ParticipantInfo> },

    /// Initiator's description, addressed to `receiver_id`
    #[serde(rename = "offer", rename_all = "camelCase")]
    Offer {
        sdp: SessionDescription,
        sender_id: ParticipantId,
        sender_label: String,
        receiver_id: ParticipantId,
    },

    /// Offer delivered to its addressee
    #[serde(rename = "getOffer", rename_all = "camelCase")]
    GetOffer {
        sdp: SessionDescription,
        sender_id: ParticipantId,
        sender_label: String,
    },

    /// Responder's description, addressed to `receiver_id`
    #[serde(rename = "answer", rename_all = "camelCase")]
    Answer {
        sdp: SessionDescription,
        sender_id: ParticipantId,
        receiver_id: ParticipantId,
    },

    /// Answer delivered to its addressee
    #[serde(rename = "getAnswer", rename_all = "camelCase")]
    GetAnswer {
        sdp: SessionDescription,
        sender_id: ParticipantId,
    },

    /// Trickled candidate, addressed to `receiver_id`
    #[serde(rename = "candidate", rename_all = "camelCase")]
    Candidate {
        candidate: IceCandidate,
        sender_id: ParticipantId,
        receiver_id: ParticipantId,
    },

    /// Candidate delivered to its addressee
    #[serde(rename = "getCandidate", rename_all = "camelCase")]
    GetCandidate {
        candidate: IceCandidate,
        sender_id: ParticipantId,
        receiver_id: ParticipantId,
    },

    /// A participant left the room
    #[serde(rename = "user_exit")]
    UserExit { id: ParticipantId },

    /// Relay-side rejection
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl SignalingMessage {
    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::JoinRoom { .. } => "join_room",
            SignalingMessage::AllUsers { .. } => "all_users",
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::GetOffer { .. } => "getOffer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::GetAnswer { .. } => "getAnswer",
            SignalingMessage::Candidate { .. } => "candidate",
            SignalingMessage::GetCandidate { .. } => "getCandidate",
            SignalingMessage::UserExit { .. } => "user_exit",
            SignalingMessage::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| DomainError::Protocol(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| DomainError::Protocol(format!("Invalid signaling frame: {}", e)))
    }
}
