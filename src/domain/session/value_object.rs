//! Negotiation value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the offer/answer exchange a session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationRole {
    /// Sends the offer
    Initiator,
    /// Answers an incoming offer
    Responder,
}

/// Negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationState {
    /// Session created, nothing exchanged yet
    Idle,
    /// Local offer applied and transmitted
    OfferSent,
    /// Remote answer received, being applied
    AnswerReceived,
    /// Remote offer received, being applied
    OfferReceived,
    /// Local answer applied and transmitted
    AnswerSent,
    /// Both descriptions applied
    Connected,
    /// Terminal
    Closed,
}

impl NegotiationState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: &NegotiationState) -> bool {
        use NegotiationState::*;

        match (self, new_state) {
            // Closed is reachable from anywhere but never left
            (Closed, _) => false,
            (_, Closed) => true,

            // Initiator path
            (Idle, OfferSent) => true,
            (OfferSent, AnswerReceived) => true,
            (AnswerReceived, Connected) => true,

            // Responder path
            (Idle, OfferReceived) => true,
            (OfferReceived, AnswerSent) => true,
            (AnswerSent, Connected) => true,

            _ => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, NegotiationState::Closed)
    }
}

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description as exchanged over signaling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Trickled connectivity candidate
///
/// Field names follow the browser `RTCIceCandidateInit` dictionary so the
/// payload can cross the relay untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.candidate)
    }
}
