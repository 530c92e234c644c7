//! Room orchestrator
//!
//! Owns the peer registry, the local media state and the observer list, and
//! reacts to signaling messages, transport callbacks and user commands. Every
//! handler runs to completion on one task; transport work is pushed into
//! per-session operation queues and driven as futures whose completions come
//! back through the same loop.

use crate::application::room::handle::{RoomCommand, RoomHandle};
use crate::application::room::observer::RoomObserver;
use crate::application::room::step::{self, StepCompletion, StepOutput};
use crate::domain::media::{LocalMediaState, LocalTrack, MediaCapture, MediaConstraints, TrackKind};
use crate::domain::room::{RemoteParticipant, RoomEvent};
use crate::domain::session::{
    CandidateDisposition, IceCandidate, NegotiationRole, NegotiationState, PeerRegistry,
    PeerSession, SdpKind, SessionDescription, SessionOp,
};
use crate::domain::shared::{DomainError, ParticipantId, Result, RoomId, SessionKey};
use crate::domain::signaling::{InboundEvent, ParticipantInfo, SignalingChannel, SignalingMessage};
use crate::domain::transport::{
    ConnectionState, TransportEngine, TransportEvent, TransportEventSink, TransportNotification,
};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Upper bound on waiting for in-flight steps after leaving
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Idle,
    Joined,
    Left,
}

/// Room to join and how to present ourselves
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub room: RoomId,
    pub display_label: String,
    pub constraints: MediaConstraints,
}

pub struct RoomOrchestrator {
    settings: RoomSettings,
    phase: RoomPhase,
    signaling: Arc<dyn SignalingChannel>,
    engine: Arc<dyn TransportEngine>,
    capture: Arc<dyn MediaCapture>,
    media: Option<LocalMediaState>,
    registry: PeerRegistry,
    roster: Vec<RemoteParticipant>,
    observer: Arc<RoomObserver>,
    transport_tx: mpsc::UnboundedSender<TransportNotification>,
    transport_rx: mpsc::UnboundedReceiver<TransportNotification>,
    commands_tx: mpsc::UnboundedSender<RoomCommand>,
    commands_rx: mpsc::UnboundedReceiver<RoomCommand>,
    in_flight: FuturesUnordered<BoxFuture<'static, StepCompletion>>,
}

impl RoomOrchestrator {
    pub fn new(
        settings: RoomSettings,
        signaling: Arc<dyn SignalingChannel>,
        engine: Arc<dyn TransportEngine>,
        capture: Arc<dyn MediaCapture>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            settings,
            phase: RoomPhase::Idle,
            signaling,
            engine,
            capture,
            media: None,
            registry: PeerRegistry::new(),
            roster: Vec::new(),
            observer: Arc::new(RoomObserver::default()),
            transport_tx,
            transport_rx,
            commands_tx,
            commands_rx,
            in_flight: FuturesUnordered::new(),
        }
    }

    pub fn handle(&self) -> RoomHandle {
        RoomHandle::new(self.commands_tx.clone(), self.observer.clone())
    }

    pub fn observer(&self) -> Arc<RoomObserver> {
        self.observer.clone()
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn local_media(&self) -> Option<&LocalMediaState> {
        self.media.as_ref()
    }

    pub fn local_id(&self) -> ParticipantId {
        self.signaling.local_id().clone()
    }

    /// Capture local media and announce ourselves to the room
    ///
    /// Nothing is sent when capture fails.
    pub async fn join(&mut self) -> Result<()> {
        if self.phase != RoomPhase::Idle {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot join room {} while {:?}",
                self.settings.room, self.phase
            )));
        }

        info!(
            "Joining room {} as {} ({})",
            self.settings.room,
            self.settings.display_label,
            self.local_id()
        );

        let source = match self.capture.capture(&self.settings.constraints).await {
            Ok(source) => source,
            Err(e) => {
                let error = match e {
                    DomainError::CaptureFailure(_) => e,
                    other => DomainError::CaptureFailure(other.to_string()),
                };
                error!("Local media capture failed: {}", error);
                self.observer.notify(RoomEvent::Error {
                    message: format!("Could not access camera and microphone: {}", error),
                });
                return Err(error);
            }
        };
        let mut media = LocalMediaState::new(source);

        let join = SignalingMessage::JoinRoom {
            room: self.settings.room.to_string(),
            display_label: self.settings.display_label.clone(),
        };
        if let Err(e) = self.signaling.send(join) {
            error!("Failed to send join_room: {}", e);
            media.release();
            self.observer.notify(RoomEvent::Error {
                message: format!("Could not reach the signaling relay: {}", e),
            });
            return Err(e);
        }

        self.media = Some(media);
        self.phase = RoomPhase::Joined;
        self.observer.notify(RoomEvent::Joined {
            room: self.settings.room.clone(),
            participant_id: self.local_id(),
        });
        Ok(())
    }

    /// Drive the room until it is left
    pub async fn run(mut self, mut inbound: mpsc::UnboundedReceiver<InboundEvent>) {
        let mut inbound_open = true;

        while self.phase != RoomPhase::Left {
            tokio::select! {
                event = inbound.recv(), if inbound_open => match event {
                    Some(event) => self.handle_signaling(event),
                    None => {
                        debug!("Signaling event stream closed");
                        inbound_open = false;
                    }
                },
                Some(notification) = self.transport_rx.recv() => self.handle_transport(notification),
                Some(done) = self.in_flight.next(), if !self.in_flight.is_empty() => self.handle_completion(done),
                Some(command) = self.commands_rx.recv() => self.handle_command(command),
            }
        }

        if !self.in_flight.is_empty() {
            debug!("Draining {} in-flight step(s)", self.in_flight.len());
            if tokio::time::timeout(DRAIN_TIMEOUT, self.settle()).await.is_err() {
                warn!("Gave up waiting for in-flight steps after leaving");
            }
        }
    }

    /// Process transport callbacks and in-flight steps until nothing is left to do
    pub async fn settle(&mut self) {
        loop {
            if let Ok(notification) = self.transport_rx.try_recv() {
                self.handle_transport(notification);
                continue;
            }
            match self.in_flight.next().await {
                Some(done) => self.handle_completion(done),
                None => break,
            }
        }
    }

    pub fn handle_signaling(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Message(message) => self.dispatch(message),
            InboundEvent::Disconnected(reason) => {
                warn!("Signaling disconnected: {}", reason);
                self.observer
                    .notify(RoomEvent::SignalingDisconnected { reason });
            }
        }
    }

    pub fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::ToggleMedia(kind) => {
                self.toggle_media(kind);
            }
            RoomCommand::SetMediaEnabled { kind, enabled } => self.set_media_enabled(kind, enabled),
            RoomCommand::Leave => self.leave(),
        }
    }

    fn dispatch(&mut self, message: SignalingMessage) {
        if self.phase != RoomPhase::Joined {
            debug!("Ignoring {} outside of a joined room", message.kind());
            return;
        }

        debug!("Received {}", message.kind());
        match message {
            SignalingMessage::AllUsers { users } => self.on_membership_snapshot(users),
            SignalingMessage::GetOffer {
                sdp,
                sender_id,
                sender_label,
            } => self.on_offer(sender_id, sender_label, sdp),
            SignalingMessage::GetAnswer { sdp, sender_id } => self.on_answer(sender_id, sdp),
            SignalingMessage::GetCandidate {
                candidate,
                sender_id,
                ..
            } => self.on_candidate(sender_id, candidate),
            SignalingMessage::UserExit { id } => self.on_participant_departed(&id),
            SignalingMessage::Error { code, message } => {
                warn!("Relay rejected a message: {} {}", code, message);
                self.observer.notify(RoomEvent::Error {
                    message: format!("{}: {}", code, message),
                });
            }
            other => warn!("Unexpected inbound message {}", other.kind()),
        }
    }

    // Signaling handlers

    fn on_membership_snapshot(&mut self, users: Vec<ParticipantInfo>) {
        let local_id = self.local_id();
        info!("Room snapshot lists {} participant(s)", users.len());

        for user in users {
            if user.id == local_id {
                continue;
            }
            if self.registry.contains(&user.id) {
                debug!("Keeping existing session with {}", user.id);
                continue;
            }

            let mut session = PeerSession::new(user.id, user.display_label, NegotiationRole::Initiator);
            session.enqueue(SessionOp::Connect {
                tracks: self.local_tracks(),
            });
            session.enqueue(SessionOp::CreateOffer);
            let key = self.insert_session(session);
            self.pump(key);
        }
    }

    fn on_offer(&mut self, sender: ParticipantId, sender_label: String, offer: SessionDescription) {
        let local_id = self.local_id();
        if sender == local_id {
            warn!("Ignoring offer carrying our own id");
            return;
        }
        if offer.kind != SdpKind::Offer {
            warn!("Ignoring getOffer from {} carrying {:?}", sender, offer.kind);
            return;
        }

        if let Some(existing) = self.registry.get(&sender) {
            let colliding = existing.role() == NegotiationRole::Initiator
                && existing.state() != NegotiationState::Connected;
            if colliding {
                if local_id < sender {
                    info!("Offer collision with {}: keeping our offer", sender);
                    return;
                }
                info!("Offer collision with {}: answering theirs", sender);
            } else {
                info!(
                    "Renegotiation from {}: replacing {:?} session",
                    sender,
                    existing.role()
                );
            }
        }

        let mut session = PeerSession::new(sender.clone(), sender_label, NegotiationRole::Responder);
        if let Err(e) = session.mark_offer_received() {
            warn!("Cannot accept offer from {}: {}", sender, e);
            return;
        }
        session.enqueue(SessionOp::Connect {
            tracks: self.local_tracks(),
        });
        session.enqueue(SessionOp::AcceptOffer(offer));
        let key = self.insert_session(session);
        self.pump(key);
    }

    fn on_answer(&mut self, sender: ParticipantId, answer: SessionDescription) {
        let Some(key) = self.registry.key_of(&sender) else {
            debug!("Discarding answer from {}: no session", sender);
            return;
        };
        if answer.kind != SdpKind::Answer {
            warn!("Ignoring getAnswer from {} carrying {:?}", sender, answer.kind);
            return;
        }
        let Some(session) = self.registry.get_by_key_mut(key) else {
            return;
        };

        if let Err(e) = session.mark_answer_received() {
            warn!("Discarding answer from {}: {}", sender, e);
            return;
        }
        session.enqueue(SessionOp::AcceptAnswer(answer));
        self.pump(key);
    }

    fn on_candidate(&mut self, sender: ParticipantId, candidate: IceCandidate) {
        let Some(key) = self.registry.key_of(&sender) else {
            debug!("Discarding candidate from {}: no session", sender);
            return;
        };
        let Some(session) = self.registry.get_by_key_mut(key) else {
            return;
        };

        match session.receive_candidate(candidate) {
            CandidateDisposition::Scheduled => self.pump(key),
            CandidateDisposition::Queued => {
                counter!("meshcall_candidates_queued_total").increment(1);
                debug!(
                    "Queued early candidate from {} ({} pending)",
                    sender,
                    session.pending_candidates()
                );
            }
            CandidateDisposition::Dropped => debug!("Dropped candidate for closed session {}", sender),
        }
    }

    fn on_participant_departed(&mut self, participant: &ParticipantId) {
        let removed = self.registry.remove(participant).is_some();
        let listed = self.remove_from_roster(participant);
        if !removed && !listed {
            debug!("user_exit for unknown participant {}", participant);
            return;
        }

        info!("Participant {} left", participant);
        self.publish_roster();
        self.observer.notify(RoomEvent::ParticipantLeft {
            participant_id: participant.clone(),
        });
    }

    // Transport callbacks and step completions

    fn handle_transport(&mut self, notification: TransportNotification) {
        let TransportNotification {
            participant,
            key,
            event,
        } = notification;
        let Some(session) = self.registry.get_by_key_mut(key) else {
            debug!("Discarding transport event for closed session with {}", participant);
            return;
        };

        match event {
            TransportEvent::LocalCandidate(candidate) => {
                if session.description_sent() {
                    self.send_candidate(&participant, candidate);
                } else {
                    session.hold_local_candidate(candidate);
                }
            }
            TransportEvent::RemoteTrack(track) => {
                let media = session.attach_remote_track(track).clone();
                let stream_id = media.stream_id.clone();
                if let Some(entry) = self
                    .roster
                    .iter_mut()
                    .find(|p| p.participant_id == participant)
                {
                    entry.remote_media = Some(media);
                }
                self.publish_roster();
                info!("Remote media {} attached for {}", stream_id, participant);
                self.observer.notify(RoomEvent::MediaAttached {
                    participant_id: participant,
                    stream_id,
                });
            }
            TransportEvent::ConnectionStateChanged(state) => {
                if state == ConnectionState::Failed {
                    warn!("Transport to {} failed", participant);
                } else {
                    debug!("Transport to {} is {:?}", participant, state);
                }
                self.observer.notify(RoomEvent::ConnectionStateChanged {
                    participant_id: participant,
                    state,
                });
            }
        }
    }

    fn handle_completion(&mut self, done: StepCompletion) {
        let StepCompletion {
            key,
            participant,
            op,
            result,
        } = done;

        let Some(session) = self.registry.get_by_key_mut(key) else {
            debug!("Discarding {} result for closed session with {}", op, participant);
            if let Ok(StepOutput::Connected(connection)) = result {
                connection.close();
            }
            return;
        };
        session.finish_op();

        match result.and_then(|output| self.apply_step(key, &participant, output)) {
            Ok(()) => self.pump(key),
            Err(error) => self.fail_session(&participant, error),
        }
    }

    fn apply_step(
        &mut self,
        key: SessionKey,
        participant: &ParticipantId,
        output: StepOutput,
    ) -> Result<()> {
        match output {
            StepOutput::Connected(connection) => {
                self.session_mut(key)?.attach_connection(connection);
                debug!("Transport connection ready for {}", participant);
            }
            StepOutput::OfferReady(offer) => {
                self.signaling
                    .send(SignalingMessage::Offer {
                        sdp: offer,
                        sender_id: self.local_id(),
                        sender_label: self.settings.display_label.clone(),
                        receiver_id: participant.clone(),
                    })
                    .map_err(|e| DomainError::negotiation(participant, format!("offer not sent: {}", e)))?;
                counter!("meshcall_offers_sent_total").increment(1);
                info!("Sent offer to {}", participant);

                self.session_mut(key)?.mark_offer_sent()?;
                self.flush_local_candidates(key);
            }
            StepOutput::AnswerReady(answer) => {
                self.signaling
                    .send(SignalingMessage::Answer {
                        sdp: answer,
                        sender_id: self.local_id(),
                        receiver_id: participant.clone(),
                    })
                    .map_err(|e| DomainError::negotiation(participant, format!("answer not sent: {}", e)))?;
                info!("Sent answer to {}", participant);

                let session = self.session_mut(key)?;
                let replayed = session.mark_remote_applied();
                session.mark_answer_sent()?;
                session.mark_connected()?;
                self.flush_local_candidates(key);
                self.peer_connected(participant, replayed);
            }
            StepOutput::RemoteApplied => {
                let session = self.session_mut(key)?;
                let replayed = session.mark_remote_applied();
                session.mark_connected()?;
                self.peer_connected(participant, replayed);
            }
            StepOutput::CandidateApplied => {
                debug!("Applied remote candidate from {}", participant);
            }
        }
        Ok(())
    }

    fn peer_connected(&self, participant: &ParticipantId, replayed: usize) {
        info!(
            "Negotiation with {} complete ({} early candidate(s) replayed)",
            participant, replayed
        );
        self.observer.notify(RoomEvent::PeerConnected {
            participant_id: participant.clone(),
        });
    }

    /// Close the session and report the failure; other sessions are untouched
    fn fail_session(&mut self, participant: &ParticipantId, error: DomainError) {
        warn!("Session with {} failed: {}", participant, error);
        counter!("meshcall_negotiation_failures_total").increment(1);

        self.registry.remove(participant);
        self.remove_from_roster(participant);
        self.publish_roster();
        self.observer.notify(RoomEvent::PeerFailed {
            participant_id: participant.clone(),
            error,
        });
    }

    // User actions

    /// Flip every local track of the class; returns the new state
    pub fn toggle_media(&mut self, kind: TrackKind) -> Option<bool> {
        let Some(media) = self.media.as_ref() else {
            debug!("No local media to toggle");
            return None;
        };
        let enabled = media.toggle(kind);
        info!("Local {} {}", kind, if enabled { "enabled" } else { "disabled" });
        self.observer
            .notify(RoomEvent::LocalMediaChanged { kind, enabled });
        Some(enabled)
    }

    pub fn set_media_enabled(&mut self, kind: TrackKind, enabled: bool) {
        let Some(media) = self.media.as_ref() else {
            debug!("No local media to update");
            return;
        };
        media.set_enabled(kind, enabled);
        self.observer
            .notify(RoomEvent::LocalMediaChanged { kind, enabled });
    }

    /// Tear down every session and release local media; calling it again does nothing
    pub fn leave(&mut self) {
        if self.phase == RoomPhase::Left {
            debug!("Room {} already left", self.settings.room);
            return;
        }

        info!("Leaving room {}", self.settings.room);
        self.signaling.disconnect();
        let closed = self.registry.remove_all();
        if let Some(mut media) = self.media.take() {
            media.release();
        }
        self.roster.clear();
        self.publish_roster();
        self.phase = RoomPhase::Left;

        info!(
            "Left room {} ({} session(s) closed)",
            self.settings.room,
            closed.len()
        );
        self.observer.notify(RoomEvent::Left);
    }

    // Helpers

    fn local_tracks(&self) -> Vec<LocalTrack> {
        self.media
            .as_ref()
            .map(|media| media.tracks().to_vec())
            .unwrap_or_default()
    }

    fn session_mut(&mut self, key: SessionKey) -> Result<&mut PeerSession> {
        self.registry
            .get_by_key_mut(key)
            .ok_or_else(|| DomainError::Internal(format!("Session {} vanished", key)))
    }

    /// Store a session and list its participant
    fn insert_session(&mut self, session: PeerSession) -> SessionKey {
        let participant_id = session.participant_id().clone();
        let display_label = session.display_label().to_string();

        let (key, evicted) = self.registry.put(session);
        if let Some(evicted) = evicted {
            debug!("Replaced {:?} session with {}", evicted.role(), participant_id);
        }

        match self
            .roster
            .iter()
            .position(|p| p.participant_id == participant_id)
        {
            Some(index) => {
                let entry = &mut self.roster[index];
                entry.display_label = display_label;
                entry.remote_media = None;
            }
            None => {
                self.roster
                    .push(RemoteParticipant::new(participant_id.clone(), display_label.clone()));
                self.observer.notify(RoomEvent::ParticipantJoined {
                    participant_id,
                    display_label,
                });
            }
        }
        self.publish_roster();
        key
    }

    fn remove_from_roster(&mut self, participant: &ParticipantId) -> bool {
        let before = self.roster.len();
        self.roster.retain(|p| &p.participant_id != participant);
        self.roster.len() != before
    }

    fn publish_roster(&self) {
        gauge!("meshcall_peer_sessions").set(self.registry.len() as f64);
        self.observer.publish_participants(self.roster.clone());
    }

    /// Start the session's next queued operation if it is idle
    fn pump(&mut self, key: SessionKey) {
        let Some(session) = self.registry.get_by_key_mut(key) else {
            return;
        };
        let Some((op, connection)) = session.start_next_op() else {
            return;
        };

        let participant = session.participant_id().clone();
        debug!("Starting {} for {}", op.name(), participant);
        let sink = TransportEventSink::new(participant.clone(), key, self.transport_tx.clone());
        self.in_flight.push(step::run(
            self.engine.clone(),
            sink,
            key,
            participant,
            op,
            connection,
        ));
    }

    fn flush_local_candidates(&mut self, key: SessionKey) {
        let Some(session) = self.registry.get_by_key_mut(key) else {
            return;
        };
        let participant = session.participant_id().clone();
        for candidate in session.take_local_candidates() {
            self.send_candidate(&participant, candidate);
        }
    }

    fn send_candidate(&self, receiver: &ParticipantId, candidate: IceCandidate) {
        let message = SignalingMessage::Candidate {
            candidate,
            sender_id: self.local_id(),
            receiver_id: receiver.clone(),
        };
        if let Err(e) = self.signaling.send(message) {
            warn!("Could not send candidate to {}: {}", receiver, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::media::capture::MockMediaCapture;
    use crate::domain::media::{LocalMediaSource, MediaHandle};
    use crate::domain::transport::PeerConnection;
    use std::sync::Mutex;

    struct RecordingChannel {
        id: ParticipantId,
        sent: Mutex<Vec<SignalingMessage>>,
        connected: Mutex<bool>,
    }

    impl RecordingChannel {
        fn new(id: &str) -> Self {
            Self {
                id: ParticipantId::from(id),
                sent: Mutex::new(Vec::new()),
                connected: Mutex::new(true),
            }
        }

        fn sent(&self) -> Vec<SignalingMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl SignalingChannel for RecordingChannel {
        fn local_id(&self) -> &ParticipantId {
            &self.id
        }

        fn send(&self, message: SignalingMessage) -> Result<()> {
            if !*self.connected.lock().unwrap() {
                return Err(DomainError::NotConnected);
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        fn disconnect(&self) {
            *self.connected.lock().unwrap() = false;
        }

        fn is_connected(&self) -> bool {
            *self.connected.lock().unwrap()
        }
    }

    struct RefusingEngine;

    #[async_trait::async_trait]
    impl TransportEngine for RefusingEngine {
        async fn create_connection(
            &self,
            participant: &ParticipantId,
            _events: TransportEventSink,
        ) -> Result<Arc<dyn PeerConnection>> {
            Err(DomainError::connection_setup(participant, "no transport in unit tests"))
        }
    }

    fn settings() -> RoomSettings {
        RoomSettings {
            room: RoomId::parse("r1").unwrap(),
            display_label: "alice".to_string(),
            constraints: MediaConstraints::default(),
        }
    }

    fn capture_ok() -> MockMediaCapture {
        let mut capture = MockMediaCapture::new();
        capture.expect_capture().returning(|_| {
            Ok(LocalMediaSource::new(vec![
                LocalTrack::new("mic", TrackKind::Audio, MediaHandle::detached()),
                LocalTrack::new("cam", TrackKind::Video, MediaHandle::detached()),
            ]))
        });
        capture
    }

    #[tokio::test]
    async fn test_join_sends_join_room() {
        let channel = Arc::new(RecordingChannel::new("a1"));
        let mut room = RoomOrchestrator::new(
            settings(),
            channel.clone(),
            Arc::new(RefusingEngine),
            Arc::new(capture_ok()),
        );
        let mut events = room.observer().subscribe_events();

        room.join().await.unwrap();

        assert_eq!(room.phase(), RoomPhase::Joined);
        assert_eq!(
            channel.sent(),
            vec![SignalingMessage::JoinRoom {
                room: "r1".to_string(),
                display_label: "alice".to_string(),
            }]
        );
        assert!(matches!(events.recv().await.unwrap(), RoomEvent::Joined { .. }));
        assert!(room.join().await.is_err());
    }

    #[tokio::test]
    async fn test_capture_failure_prevents_join() {
        let mut capture = MockMediaCapture::new();
        capture
            .expect_capture()
            .times(1)
            .returning(|_| Err(DomainError::CaptureFailure("permission denied".to_string())));

        let channel = Arc::new(RecordingChannel::new("a1"));
        let mut room = RoomOrchestrator::new(
            settings(),
            channel.clone(),
            Arc::new(RefusingEngine),
            Arc::new(capture),
        );
        let mut events = room.observer().subscribe_events();

        let result = room.join().await;

        assert!(matches!(result, Err(DomainError::CaptureFailure(_))));
        assert!(channel.sent().is_empty());
        assert_eq!(room.phase(), RoomPhase::Idle);
        assert!(matches!(events.recv().await.unwrap(), RoomEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_messages_before_join_are_ignored() {
        let channel = Arc::new(RecordingChannel::new("a1"));
        let mut room = RoomOrchestrator::new(
            settings(),
            channel.clone(),
            Arc::new(RefusingEngine),
            Arc::new(capture_ok()),
        );

        room.handle_signaling(InboundEvent::Message(SignalingMessage::AllUsers {
            users: vec![ParticipantInfo {
                id: "b1".into(),
                display_label: "bob".to_string(),
            }],
        }));

        assert!(room.registry().is_empty());
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_connection_setup_failure_is_contained() {
        let channel = Arc::new(RecordingChannel::new("a1"));
        let mut room = RoomOrchestrator::new(
            settings(),
            channel.clone(),
            Arc::new(RefusingEngine),
            Arc::new(capture_ok()),
        );
        room.join().await.unwrap();
        let mut events = room.observer().subscribe_events();

        room.handle_signaling(InboundEvent::Message(SignalingMessage::AllUsers {
            users: vec![ParticipantInfo {
                id: "b1".into(),
                display_label: "bob".to_string(),
            }],
        }));
        room.settle().await;

        assert!(room.registry().is_empty());
        assert!(room.observer().participants().is_empty());
        assert_eq!(room.phase(), RoomPhase::Joined);

        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            if let RoomEvent::PeerFailed { error, .. } = event {
                assert!(matches!(error, DomainError::ConnectionSetupFailure { .. }));
                failed = true;
            }
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn test_toggle_without_media() {
        let mut room = RoomOrchestrator::new(
            settings(),
            Arc::new(RecordingChannel::new("a1")),
            Arc::new(RefusingEngine),
            Arc::new(capture_ok()),
        );
        assert_eq!(room.toggle_media(TrackKind::Audio), None);
    }

    #[tokio::test]
    async fn test_run_stops_on_leave_command() {
        let channel = Arc::new(RecordingChannel::new("a1"));
        let mut room = RoomOrchestrator::new(
            settings(),
            channel.clone(),
            Arc::new(RefusingEngine),
            Arc::new(capture_ok()),
        );
        room.join().await.unwrap();
        let handle = room.handle();
        let (_inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(room.run(inbound_rx));
        handle.toggle_audio().unwrap();
        handle.leave().unwrap();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!channel.is_connected());
    }
}
