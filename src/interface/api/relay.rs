/// Signaling relay for meshcall clients
///
/// Keeps room membership and forwards addressed messages between the
/// WebSocket connections of one room. It never looks inside descriptions
/// or candidates.
use crate::domain::shared::{ParticipantId, RoomId};
use crate::domain::signaling::{ParticipantInfo, SignalingMessage};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

/// Relay-side rejections, sent back to the offending connection as `error`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Participant {0} is already connected")]
    DuplicateParticipant(ParticipantId),

    #[error("Room {0} is full")]
    RoomFull(String),

    #[error("Invalid room name: {0}")]
    InvalidRoom(String),

    #[error("Peer {0} not found")]
    PeerNotFound(ParticipantId),

    #[error("Sender ID does not match connection")]
    SenderMismatch,

    #[error("Participant {0} is not in the sender's room")]
    NotInRoom(ParticipantId),

    #[error("Invalid message format: {0}")]
    Parse(String),

    #[error("Unexpected message type {0}")]
    UnexpectedMessage(&'static str),
}

impl RelayError {
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::DuplicateParticipant(_) => "DUPLICATE_PARTICIPANT",
            RelayError::RoomFull(_) => "ROOM_FULL",
            RelayError::InvalidRoom(_) => "INVALID_ROOM",
            RelayError::PeerNotFound(_) => "PEER_NOT_FOUND",
            RelayError::SenderMismatch => "SENDER_MISMATCH",
            RelayError::NotInRoom(_) => "NOT_IN_ROOM",
            RelayError::Parse(_) => "PARSE_ERROR",
            RelayError::UnexpectedMessage(_) => "UNEXPECTED_MESSAGE",
        }
    }

    pub fn to_message(&self) -> SignalingMessage {
        SignalingMessage::Error {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// One live relay connection
#[derive(Debug)]
struct RelayConnection {
    tx: mpsc::UnboundedSender<SignalingMessage>,
    room: Option<RoomId>,
    display_label: String,
    connected_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default)]
struct RelayInner {
    connections: HashMap<ParticipantId, RelayConnection>,
    /// Room members in join order
    rooms: HashMap<RoomId, Vec<ParticipantId>>,
}

impl RelayInner {
    /// Drop the participant from its room and tell the others
    fn leave_room(&mut self, participant_id: &ParticipantId) {
        let Some(room) = self
            .connections
            .get_mut(participant_id)
            .and_then(|c| c.room.take())
        else {
            return;
        };

        let remaining = match self.rooms.get_mut(&room) {
            Some(members) => {
                members.retain(|m| m != participant_id);
                members.clone()
            }
            None => Vec::new(),
        };
        if remaining.is_empty() {
            self.rooms.remove(&room);
            debug!("Room {} is empty", room);
        }

        for member in &remaining {
            if let Some(connection) = self.connections.get(member) {
                let _ = connection.tx.send(SignalingMessage::UserExit {
                    id: participant_id.clone(),
                });
            }
        }
        info!("{} left room {}", participant_id, room);
    }
}

/// Relay state shared by every connection
pub struct RelayState {
    inner: RwLock<RelayInner>,
    /// Zero means unlimited
    max_room_size: usize,
}

impl RelayState {
    pub fn new(max_room_size: usize) -> Self {
        Self {
            inner: RwLock::new(RelayInner::default()),
            max_room_size,
        }
    }

    /// Register a connection and return its outbound queue
    pub async fn register(
        &self,
        participant_id: ParticipantId,
    ) -> Result<mpsc::UnboundedReceiver<SignalingMessage>, RelayError> {
        let mut inner = self.inner.write().await;
        if inner.connections.contains_key(&participant_id) {
            return Err(RelayError::DuplicateParticipant(participant_id));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.connections.insert(
            participant_id.clone(),
            RelayConnection {
                tx,
                room: None,
                display_label: String::new(),
                connected_at: chrono::Utc::now(),
            },
        );
        gauge!("meshcall_relay_connections").set(inner.connections.len() as f64);
        info!("Relay connection registered: {}", participant_id);
        Ok(rx)
    }

    /// Remove a connection; remaining room members get `user_exit`
    pub async fn unregister(&self, participant_id: &ParticipantId) {
        let mut inner = self.inner.write().await;
        inner.leave_room(participant_id);
        if let Some(connection) = inner.connections.remove(participant_id) {
            let duration = chrono::Utc::now() - connection.connected_at;
            info!(
                "Relay connection closed: {} after {}s",
                participant_id,
                duration.num_seconds()
            );
        }
        gauge!("meshcall_relay_connections").set(inner.connections.len() as f64);
    }

    /// Put the participant in a room and list the members already there
    pub async fn join_room(
        &self,
        participant_id: &ParticipantId,
        room: &str,
        display_label: String,
    ) -> Result<Vec<ParticipantInfo>, RelayError> {
        let room = RoomId::parse(room).map_err(RelayError::InvalidRoom)?;
        let mut inner = self.inner.write().await;

        let already_here = inner
            .connections
            .get(participant_id)
            .and_then(|c| c.room.as_ref())
            == Some(&room);
        if !already_here {
            let members = inner.rooms.get(&room).map(Vec::len).unwrap_or(0);
            if self.max_room_size > 0 && members >= self.max_room_size {
                return Err(RelayError::RoomFull(room.to_string()));
            }
            inner.leave_room(participant_id);
        }

        let Some(connection) = inner.connections.get_mut(participant_id) else {
            return Err(RelayError::PeerNotFound(participant_id.clone()));
        };
        connection.room = Some(room.clone());
        connection.display_label = display_label;

        let members = inner.rooms.entry(room.clone()).or_default();
        if !members.contains(participant_id) {
            members.push(participant_id.clone());
        }
        let others: Vec<ParticipantId> = members
            .iter()
            .filter(|m| *m != participant_id)
            .cloned()
            .collect();

        info!(
            "{} joined room {} ({} other member(s))",
            participant_id,
            room,
            others.len()
        );

        Ok(others
            .into_iter()
            .filter_map(|id| {
                let label = inner.connections.get(&id)?.display_label.clone();
                Some(ParticipantInfo {
                    id,
                    display_label: label,
                })
            })
            .collect())
    }

    /// Queue a message for one connection
    pub async fn send_to(
        &self,
        participant_id: &ParticipantId,
        message: SignalingMessage,
    ) -> Result<(), RelayError> {
        let inner = self.inner.read().await;
        let connection = inner
            .connections
            .get(participant_id)
            .ok_or_else(|| RelayError::PeerNotFound(participant_id.clone()))?;
        connection
            .tx
            .send(message)
            .map_err(|_| RelayError::PeerNotFound(participant_id.clone()))
    }

    /// Forward a message between two members of the same room
    async fn forward(
        &self,
        sender_id: &ParticipantId,
        receiver_id: &ParticipantId,
        message: SignalingMessage,
    ) -> Result<(), RelayError> {
        let inner = self.inner.read().await;
        let sender_room = inner
            .connections
            .get(sender_id)
            .and_then(|c| c.room.as_ref())
            .ok_or_else(|| RelayError::NotInRoom(sender_id.clone()))?;
        let receiver = inner
            .connections
            .get(receiver_id)
            .ok_or_else(|| RelayError::PeerNotFound(receiver_id.clone()))?;
        if receiver.room.as_ref() != Some(sender_room) {
            return Err(RelayError::NotInRoom(receiver_id.clone()));
        }
        receiver
            .tx
            .send(message)
            .map_err(|_| RelayError::PeerNotFound(receiver_id.clone()))
    }

    /// Members of a room in join order
    pub async fn room_members(&self, room: &str) -> Vec<ParticipantId> {
        let Ok(room) = RoomId::parse(room) else {
            return Vec::new();
        };
        let inner = self.inner.read().await;
        inner.rooms.get(&room).cloned().unwrap_or_default()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Handle one inbound message from `participant_id`
    pub async fn handle_message(&self, participant_id: &ParticipantId, message: SignalingMessage) {
        counter!("meshcall_relay_messages_total", "type" => message.kind()).increment(1);

        if let Err(e) = self.route(participant_id, message).await {
            warn!("Rejected message from {}: {}", participant_id, e);
            let _ = self.send_to(participant_id, e.to_message()).await;
        }
    }

    async fn route(
        &self,
        participant_id: &ParticipantId,
        message: SignalingMessage,
    ) -> Result<(), RelayError> {
        match message {
            SignalingMessage::JoinRoom {
                room,
                display_label,
            } => {
                let users = self.join_room(participant_id, &room, display_label).await?;
                self.send_to(participant_id, SignalingMessage::AllUsers { users })
                    .await
            }

            SignalingMessage::Offer {
                sdp,
                sender_id,
                sender_label,
                receiver_id,
            } => {
                verify_sender(participant_id, &sender_id)?;
                info!("Forwarding offer from {} to {}", sender_id, receiver_id);
                self.forward(
                    participant_id,
                    &receiver_id,
                    SignalingMessage::GetOffer {
                        sdp,
                        sender_id,
                        sender_label,
                    },
                )
                .await
            }

            SignalingMessage::Answer {
                sdp,
                sender_id,
                receiver_id,
            } => {
                verify_sender(participant_id, &sender_id)?;
                info!("Forwarding answer from {} to {}", sender_id, receiver_id);
                self.forward(
                    participant_id,
                    &receiver_id,
                    SignalingMessage::GetAnswer { sdp, sender_id },
                )
                .await
            }

            SignalingMessage::Candidate {
                candidate,
                sender_id,
                receiver_id,
            } => {
                verify_sender(participant_id, &sender_id)?;
                debug!("Forwarding candidate from {} to {}", sender_id, receiver_id);
                self.forward(
                    participant_id,
                    &receiver_id,
                    SignalingMessage::GetCandidate {
                        candidate,
                        sender_id,
                        receiver_id: receiver_id.clone(),
                    },
                )
                .await
            }

            other => Err(RelayError::UnexpectedMessage(other.kind())),
        }
    }
}

fn verify_sender(connection: &ParticipantId, sender: &ParticipantId) -> Result<(), RelayError> {
    if connection != sender {
        return Err(RelayError::SenderMismatch);
    }
    Ok(())
}

/// WebSocket handler for `/signaling/:participant_id`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(participant_id): Path<String>,
    State(state): State<Arc<RelayState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, ParticipantId::new(participant_id), state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, participant_id: ParticipantId, state: Arc<RelayState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut rx = match state.register(participant_id.clone()).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!("Refusing relay connection {}: {}", participant_id, e);
            if let Ok(json) = e.to_message().to_json() {
                let _ = sender.send(Message::Text(json)).await;
            }
            let _ = sender.close().await;
            return;
        }
    };

    // Task to send messages to this participant
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match message.to_json() {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Task to receive messages from this participant
    let state_clone = state.clone();
    let participant_clone = participant_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    debug!("Received signaling message from {}: {}", participant_clone, text);

                    match SignalingMessage::from_json(&text) {
                        Ok(message) => state_clone.handle_message(&participant_clone, message).await,
                        Err(e) => {
                            warn!("Failed to parse signaling message: {}", e);
                            let _ = state_clone
                                .send_to(&participant_clone, RelayError::Parse(e.to_string()).to_message())
                                .await;
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket closed for {}", participant_clone);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("WebSocket error for {}: {}", participant_clone, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    // Cleanup
    state.unregister(&participant_id).await;
}
