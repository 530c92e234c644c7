//! Peer session entity
//!
//! One session per remote participant. It owns the negotiation state, the
//! transport connection, the candidates that arrived too early and the
//! queue of transport operations still to run. Operations run one at a time,
//! which keeps candidate application FIFO per session.

use crate::domain::media::{LocalTrack, RemoteMedia, RemoteTrack};
use crate::domain::session::value_object::{
    IceCandidate, NegotiationRole, NegotiationState, SessionDescription,
};
use crate::domain::shared::{DomainError, ParticipantId, Result};
use crate::domain::transport::PeerConnection;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Transport operation waiting to run for a session
#[derive(Debug, Clone)]
pub enum SessionOp {
    /// Build the transport connection and attach the local tracks
    Connect { tracks: Vec<LocalTrack> },
    /// Build an offer and apply it locally
    CreateOffer,
    /// Apply a remote offer, then build and apply the answer
    AcceptOffer(SessionDescription),
    /// Apply a remote answer
    AcceptAnswer(SessionDescription),
    AddCandidate(IceCandidate),
}

impl SessionOp {
    pub fn name(&self) -> &'static str {
        match self {
            SessionOp::Connect { .. } => "connect",
            SessionOp::CreateOffer => "create_offer",
            SessionOp::AcceptOffer(_) => "accept_offer",
            SessionOp::AcceptAnswer(_) => "accept_answer",
            SessionOp::AddCandidate(_) => "add_candidate",
        }
    }
}

/// What happened to an incoming candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    /// Scheduled for application right away
    Scheduled,
    /// Held until the remote description is applied
    Queued,
    /// Session is closed
    Dropped,
}

pub struct PeerSession {
    participant_id: ParticipantId,
    display_label: String,
    role: NegotiationRole,
    state: NegotiationState,
    connection: Option<Arc<dyn PeerConnection>>,
    remote_description_applied: bool,
    pending_candidates: VecDeque<IceCandidate>,
    outbound_candidates: VecDeque<IceCandidate>,
    remote_media: Option<RemoteMedia>,
    ops: VecDeque<SessionOp>,
    busy: bool,
    created_at: DateTime<Utc>,
}

impl PeerSession {
    pub fn new(participant_id: ParticipantId, display_label: String, role: NegotiationRole) -> Self {
        Self {
            participant_id,
            display_label,
            role,
            state: NegotiationState::Idle,
            connection: None,
            remote_description_applied: false,
            pending_candidates: VecDeque::new(),
            outbound_candidates: VecDeque::new(),
            remote_media: None,
            ops: VecDeque::new(),
            busy: false,
            created_at: Utc::now(),
        }
    }

    // Negotiation transitions

    pub fn mark_offer_sent(&mut self) -> Result<()> {
        self.transition_to(NegotiationState::OfferSent)
    }

    pub fn mark_answer_received(&mut self) -> Result<()> {
        self.transition_to(NegotiationState::AnswerReceived)
    }

    pub fn mark_offer_received(&mut self) -> Result<()> {
        self.transition_to(NegotiationState::OfferReceived)
    }

    pub fn mark_answer_sent(&mut self) -> Result<()> {
        self.transition_to(NegotiationState::AnswerSent)
    }

    pub fn mark_connected(&mut self) -> Result<()> {
        self.transition_to(NegotiationState::Connected)
    }

    fn transition_to(&mut self, new_state: NegotiationState) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(DomainError::InvalidStateTransition(format!(
                "Session {}: cannot transition from {:?} to {:?}",
                self.participant_id, self.state, new_state
            )));
        }

        debug!(
            "Session {} state transition: {:?} -> {:?}",
            self.participant_id, self.state, new_state
        );
        self.state = new_state;
        Ok(())
    }

    // Transport operations

    pub fn attach_connection(&mut self, connection: Arc<dyn PeerConnection>) {
        self.connection = Some(connection);
    }

    pub fn enqueue(&mut self, op: SessionOp) {
        if self.state.is_closed() {
            return;
        }
        self.ops.push_back(op);
    }

    /// Take the next operation if none is running
    ///
    /// Returns the operation together with the connection it should run
    /// against (absent only before `Connect` completed).
    pub fn start_next_op(&mut self) -> Option<(SessionOp, Option<Arc<dyn PeerConnection>>)> {
        if self.busy || self.state.is_closed() {
            return None;
        }
        let op = self.ops.pop_front()?;
        self.busy = true;
        Some((op, self.connection.clone()))
    }

    pub fn finish_op(&mut self) {
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn queued_ops(&self) -> usize {
        self.ops.len()
    }

    /// Route an incoming candidate
    pub fn receive_candidate(&mut self, candidate: IceCandidate) -> CandidateDisposition {
        if self.state.is_closed() {
            return CandidateDisposition::Dropped;
        }
        if self.remote_description_applied {
            self.ops.push_back(SessionOp::AddCandidate(candidate));
            CandidateDisposition::Scheduled
        } else {
            self.pending_candidates.push_back(candidate);
            CandidateDisposition::Queued
        }
    }

    /// Record that the remote description is applied and replay held candidates
    ///
    /// Returns the number of candidates moved to the operation queue.
    pub fn mark_remote_applied(&mut self) -> usize {
        self.remote_description_applied = true;
        let replayed = self.pending_candidates.len();
        while let Some(candidate) = self.pending_candidates.pop_front() {
            self.ops.push_back(SessionOp::AddCandidate(candidate));
        }
        replayed
    }

    /// Whether our description has gone out to the remote side
    pub fn description_sent(&self) -> bool {
        matches!(
            self.state,
            NegotiationState::OfferSent
                | NegotiationState::AnswerReceived
                | NegotiationState::AnswerSent
                | NegotiationState::Connected
        )
    }

    /// Hold a local candidate produced before our description was sent
    pub fn hold_local_candidate(&mut self, candidate: IceCandidate) {
        if !self.state.is_closed() {
            self.outbound_candidates.push_back(candidate);
        }
    }

    pub fn take_local_candidates(&mut self) -> Vec<IceCandidate> {
        self.outbound_candidates.drain(..).collect()
    }

    /// Replace the attached media, merging tracks of the same stream
    pub fn attach_remote_track(&mut self, track: RemoteTrack) -> &RemoteMedia {
        let media = RemoteMedia::attach(self.remote_media.as_ref(), track);
        self.remote_media.insert(media)
    }

    /// Close the session and release its transport
    ///
    /// Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.state.is_closed() {
            return false;
        }
        self.state = NegotiationState::Closed;
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        self.ops.clear();
        self.pending_candidates.clear();
        self.outbound_candidates.clear();
        self.busy = false;
        debug!(
            "Session {} closed after {}s",
            self.participant_id,
            (Utc::now() - self.created_at).num_seconds()
        );
        true
    }

    // Getters
    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    pub fn display_label(&self) -> &str {
        &self.display_label
    }

    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    pub fn remote_description_applied(&self) -> bool {
        self.remote_description_applied
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn remote_media(&self) -> Option<&RemoteMedia> {
        self.remote_media.as_ref()
    }
}

impl fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("participant_id", &self.participant_id)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("has_connection", &self.connection.is_some())
            .field("remote_description_applied", &self.remote_description_applied)
            .field("pending_candidates", &self.pending_candidates.len())
            .field("queued_ops", &self.ops.len())
            .field("busy", &self.busy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct ClosingConnection {
        closed: AtomicBool,
    }

    #[async_trait::async_trait]
    impl PeerConnection for ClosingConnection {
        async fn create_offer(&self) -> Result<SessionDescription> {
            Ok(SessionDescription::offer("v=0"))
        }
        async fn create_answer(&self) -> Result<SessionDescription> {
            Ok(SessionDescription::answer("v=0"))
        }
        async fn set_local_description(&self, _: SessionDescription) -> Result<()> {
            Ok(())
        }
        async fn set_remote_description(&self, _: SessionDescription) -> Result<()> {
            Ok(())
        }
        async fn add_remote_candidate(&self, _: IceCandidate) -> Result<()> {
            Ok(())
        }
        async fn add_local_track(&self, _: &LocalTrack) -> Result<()> {
            Ok(())
        }
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn initiator() -> PeerSession {
        PeerSession::new(ParticipantId::from("b1"), "bob".to_string(), NegotiationRole::Initiator)
    }

    #[test]
    fn test_initiator_lifecycle() {
        let mut session = initiator();
        assert_eq!(session.state(), NegotiationState::Idle);

        session.mark_offer_sent().unwrap();
        session.mark_answer_received().unwrap();
        session.mark_connected().unwrap();
        assert_eq!(session.state(), NegotiationState::Connected);
    }

    #[test]
    fn test_answer_before_offer_rejected() {
        let mut session = initiator();
        let result = session.mark_answer_received();
        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
        assert_eq!(session.state(), NegotiationState::Idle);
    }

    #[test]
    fn test_early_candidates_replay_in_order() {
        let mut session = initiator();

        assert_eq!(
            session.receive_candidate(IceCandidate::new("c1")),
            CandidateDisposition::Queued
        );
        assert_eq!(
            session.receive_candidate(IceCandidate::new("c2")),
            CandidateDisposition::Queued
        );
        assert_eq!(session.pending_candidates(), 2);
        assert_eq!(session.queued_ops(), 0);

        assert_eq!(session.mark_remote_applied(), 2);
        assert_eq!(
            session.receive_candidate(IceCandidate::new("c3")),
            CandidateDisposition::Scheduled
        );

        let mut applied = Vec::new();
        while let Some((op, _)) = session.start_next_op() {
            if let SessionOp::AddCandidate(c) = op {
                applied.push(c.candidate);
            }
            session.finish_op();
        }
        assert_eq!(applied, vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn test_ops_run_one_at_a_time() {
        let mut session = initiator();
        session.enqueue(SessionOp::CreateOffer);
        session.enqueue(SessionOp::CreateOffer);

        assert!(session.start_next_op().is_some());
        assert!(session.is_busy());
        assert!(session.start_next_op().is_none());

        session.finish_op();
        assert!(session.start_next_op().is_some());
    }

    #[test]
    fn test_local_candidates_held_until_offer_sent() {
        let mut session = initiator();
        assert!(!session.description_sent());
        session.hold_local_candidate(IceCandidate::new("l1"));
        session.hold_local_candidate(IceCandidate::new("l2"));

        session.mark_offer_sent().unwrap();
        assert!(session.description_sent());
        let held: Vec<String> = session
            .take_local_candidates()
            .into_iter()
            .map(|c| c.candidate)
            .collect();
        assert_eq!(held, vec!["l1", "l2"]);
        assert!(session.take_local_candidates().is_empty());
    }

    #[test]
    fn test_close_releases_connection_once() {
        let connection = Arc::new(ClosingConnection::default());
        let mut session = initiator();
        session.attach_connection(connection.clone());
        session.receive_candidate(IceCandidate::new("c1"));
        session.enqueue(SessionOp::CreateOffer);

        assert!(session.close());
        assert!(connection.closed.load(Ordering::SeqCst));
        assert!(!session.has_connection());
        assert_eq!(session.pending_candidates(), 0);
        assert!(session.start_next_op().is_none());
        assert_eq!(
            session.receive_candidate(IceCandidate::new("c2")),
            CandidateDisposition::Dropped
        );

        assert!(!session.close());
    }
}
