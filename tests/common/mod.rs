//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use meshcall::application::{RoomOrchestrator, RoomSettings};
use meshcall::domain::media::{
    LocalMediaSource, LocalTrack, MediaCapture, MediaConstraints, MediaHandle, RemoteTrack,
    TrackKind,
};
use meshcall::domain::room::RoomEvent;
use meshcall::domain::session::{IceCandidate, SdpKind, SessionDescription};
use meshcall::domain::shared::{ParticipantId, RoomId};
use meshcall::domain::signaling::{InboundEvent, ParticipantInfo, SignalingChannel, SignalingMessage};
use meshcall::domain::transport::{
    ConnectionState, PeerConnection, TransportEngine, TransportEvent, TransportEventSink,
};
use meshcall::{DomainError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Signaling channel that records everything sent through it
pub struct RecordingSignaling {
    id: ParticipantId,
    sent: Mutex<Vec<SignalingMessage>>,
    refused: Mutex<Vec<&'static str>>,
    connected: AtomicBool,
}

impl RecordingSignaling {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: ParticipantId::from(id),
            sent: Mutex::new(Vec::new()),
            refused: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    /// Make `send` fail for one message type
    pub fn refuse(&self, kind: &'static str) {
        self.refused.lock().unwrap().push(kind);
    }

    pub fn sent(&self) -> Vec<SignalingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_of(&self, kind: &str) -> Vec<SignalingMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.kind() == kind)
            .collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(|m| m.kind()).collect()
    }
}

impl SignalingChannel for RecordingSignaling {
    fn local_id(&self) -> &ParticipantId {
        &self.id
    }

    fn send(&self, message: SignalingMessage) -> Result<()> {
        if !self.is_connected() || self.refused.lock().unwrap().contains(&message.kind()) {
            return Err(DomainError::NotConnected);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Transport call as seen by a [`FakeConnection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpKind),
    SetRemote(SdpKind),
    AddCandidate(String),
}

/// Transport call a [`FakeConnection`] can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failing {
    CreateOffer,
    CreateAnswer,
    SetRemote,
    AddCandidate,
}

pub struct FakeConnection {
    participant: ParticipantId,
    sink: TransportEventSink,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<Vec<Failing>>,
    tracks: Mutex<Vec<LocalTrack>>,
    closed: AtomicBool,
}

impl FakeConnection {
    /// Make every later call of this kind fail
    pub fn fail(&self, call: Failing) {
        self.failing.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::AddCandidate(candidate) => Some(candidate),
                _ => None,
            })
            .collect()
    }

    pub fn tracks(&self) -> Vec<LocalTrack> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn emit_candidate(&self, candidate: &str) {
        self.sink
            .emit(TransportEvent::LocalCandidate(IceCandidate::new(candidate)));
    }

    pub fn emit_track(&self, id: &str, stream_id: &str, kind: TrackKind) {
        self.sink.emit(TransportEvent::RemoteTrack(RemoteTrack {
            id: id.to_string(),
            stream_id: stream_id.to_string(),
            kind,
            handle: MediaHandle::detached(),
        }));
    }

    pub fn emit_state(&self, state: ConnectionState) {
        self.sink.emit(TransportEvent::ConnectionStateChanged(state));
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, call: Failing) -> Result<()> {
        if self.failing.lock().unwrap().contains(&call) {
            return Err(DomainError::negotiation(
                &self.participant,
                format!("{:?} refused by test connection", call),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PeerConnection for FakeConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record(Call::CreateOffer);
        self.check(Failing::CreateOffer)?;
        Ok(SessionDescription::offer(format!("offer for {}", self.participant)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(Call::CreateAnswer);
        self.check(Failing::CreateAnswer)?;
        Ok(SessionDescription::answer(format!("answer for {}", self.participant)))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.record(Call::SetLocal(description.kind));
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.record(Call::SetRemote(description.kind));
        self.check(Failing::SetRemote)
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(Call::AddCandidate(candidate.candidate));
        self.check(Failing::AddCandidate)
    }

    async fn add_local_track(&self, track: &LocalTrack) -> Result<()> {
        self.tracks.lock().unwrap().push(track.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Scripted transport engine handing out [`FakeConnection`]s
#[derive(Default)]
pub struct FakeEngine {
    connections: Mutex<Vec<(ParticipantId, Arc<FakeConnection>)>>,
    refused: Mutex<Vec<ParticipantId>>,
    failing: Mutex<Vec<(ParticipantId, Failing)>>,
    early_candidate: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail connection setup for one participant
    pub fn refuse(&self, participant: &str) {
        self.refused.lock().unwrap().push(ParticipantId::from(participant));
    }

    /// Connections to the participant fail this call from the start
    pub fn fail_on(&self, participant: &str, call: Failing) {
        self.failing
            .lock()
            .unwrap()
            .push((ParticipantId::from(participant), call));
    }

    /// Emit a local candidate as soon as a connection is created
    pub fn gather_early(&self) {
        self.early_candidate.store(true, Ordering::SeqCst);
    }

    pub fn connections_for(&self, participant: &str) -> Vec<Arc<FakeConnection>> {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id.as_str() == participant)
            .map(|(_, connection)| connection.clone())
            .collect()
    }

    /// Most recent connection to the participant
    pub fn connection(&self, participant: &str) -> Arc<FakeConnection> {
        self.connections_for(participant)
            .pop()
            .unwrap_or_else(|| panic!("no connection to {}", participant))
    }

    pub fn created(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl TransportEngine for FakeEngine {
    async fn create_connection(
        &self,
        participant: &ParticipantId,
        events: TransportEventSink,
    ) -> Result<Arc<dyn PeerConnection>> {
        if self.refused.lock().unwrap().contains(participant) {
            return Err(DomainError::connection_setup(participant, "refused by test engine"));
        }

        let connection = Arc::new(FakeConnection {
            participant: participant.clone(),
            sink: events,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(
                self.failing
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|(id, _)| id == participant)
                    .map(|(_, call)| *call)
                    .collect(),
            ),
            tracks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        if self.early_candidate.load(Ordering::SeqCst) {
            connection.emit_candidate("candidate:early");
        }
        self.connections
            .lock()
            .unwrap()
            .push((participant.clone(), connection.clone()));
        Ok(connection)
    }
}

/// Capture returning detached audio and video tracks
pub struct FakeCapture {
    fail: bool,
}

impl FakeCapture {
    pub fn working() -> Arc<Self> {
        Arc::new(Self { fail: false })
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self { fail: true })
    }
}

#[async_trait::async_trait]
impl MediaCapture for FakeCapture {
    async fn capture(&self, constraints: &MediaConstraints) -> Result<LocalMediaSource> {
        if self.fail {
            return Err(DomainError::CaptureFailure("permission denied".to_string()));
        }
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(LocalTrack::new("mic", TrackKind::Audio, MediaHandle::detached()));
        }
        if constraints.video.is_some() {
            tracks.push(LocalTrack::new("cam", TrackKind::Video, MediaHandle::detached()));
        }
        Ok(LocalMediaSource::new(tracks))
    }
}

pub fn settings(label: &str) -> RoomSettings {
    RoomSettings {
        room: RoomId::parse("r1").unwrap(),
        display_label: label.to_string(),
        constraints: MediaConstraints::default(),
    }
}

/// Room for `local_id` that has already joined "r1"
pub async fn joined_room(
    local_id: &str,
) -> (RoomOrchestrator, Arc<RecordingSignaling>, Arc<FakeEngine>) {
    let signaling = RecordingSignaling::new(local_id);
    let engine = FakeEngine::new();
    let mut room = RoomOrchestrator::new(
        settings(local_id),
        signaling.clone(),
        engine.clone(),
        FakeCapture::working(),
    );
    room.join().await.unwrap();
    (room, signaling, engine)
}

pub fn snapshot(users: &[(&str, &str)]) -> InboundEvent {
    InboundEvent::Message(SignalingMessage::AllUsers {
        users: users
            .iter()
            .map(|(id, label)| ParticipantInfo {
                id: ParticipantId::from(*id),
                display_label: label.to_string(),
            })
            .collect(),
    })
}

pub fn get_offer(from: &str, label: &str) -> InboundEvent {
    InboundEvent::Message(SignalingMessage::GetOffer {
        sdp: SessionDescription::offer(format!("offer from {}", from)),
        sender_id: ParticipantId::from(from),
        sender_label: label.to_string(),
    })
}

pub fn get_answer(from: &str) -> InboundEvent {
    InboundEvent::Message(SignalingMessage::GetAnswer {
        sdp: SessionDescription::answer(format!("answer from {}", from)),
        sender_id: ParticipantId::from(from),
    })
}

pub fn get_candidate(from: &str, to: &str, candidate: &str) -> InboundEvent {
    InboundEvent::Message(SignalingMessage::GetCandidate {
        candidate: IceCandidate::new(candidate),
        sender_id: ParticipantId::from(from),
        receiver_id: ParticipantId::from(to),
    })
}

pub fn user_exit(id: &str) -> InboundEvent {
    InboundEvent::Message(SignalingMessage::UserExit {
        id: ParticipantId::from(id),
    })
}

/// Everything published so far without waiting
pub fn drain(events: &mut broadcast::Receiver<RoomEvent>) -> Vec<RoomEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
