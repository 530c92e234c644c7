//! Media transport port
//!
//! The core drives the real-time transport engine only through these two
//! traits. Engine callbacks (local candidates, remote tracks, connection
//! state) come back as [`TransportEvent`]s on the room's event loop.

use crate::domain::media::{LocalTrack, RemoteTrack};
use crate::domain::session::{IceCandidate, SessionDescription};
use crate::domain::shared::{ParticipantId, Result, SessionKey};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Transport-level connection state as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Callback raised by a transport connection
#[derive(Debug, Clone)]
pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    RemoteTrack(RemoteTrack),
    ConnectionStateChanged(ConnectionState),
}

/// Transport event tagged with the session it belongs to
#[derive(Debug, Clone)]
pub struct TransportNotification {
    pub participant: ParticipantId,
    pub key: SessionKey,
    pub event: TransportEvent,
}

/// Where a connection delivers its callbacks
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    participant: ParticipantId,
    key: SessionKey,
    tx: mpsc::UnboundedSender<TransportNotification>,
}

impl TransportEventSink {
    pub fn new(
        participant: ParticipantId,
        key: SessionKey,
        tx: mpsc::UnboundedSender<TransportNotification>,
    ) -> Self {
        Self {
            participant,
            key,
            tx,
        }
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    /// Deliver an event; returns false once the room loop is gone
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TransportNotification {
                participant: self.participant.clone(),
                key: self.key,
                event,
            })
            .is_ok()
    }
}

/// One transport connection to one remote participant
#[async_trait::async_trait]
pub trait PeerConnection: Send + Sync {
    /// Build an offer with audio and video send/receive enabled
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn add_local_track(&self, track: &LocalTrack) -> Result<()>;

    /// Release the connection
    ///
    /// Never suspends; engines finish their teardown in the background.
    fn close(&self);
}

/// Factory for transport connections
#[async_trait::async_trait]
pub trait TransportEngine: Send + Sync {
    async fn create_connection(
        &self,
        participant: &ParticipantId,
        events: TransportEventSink,
    ) -> Result<Arc<dyn PeerConnection>>;
}
