//! Signaling relay integration tests over real WebSockets

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use meshcall::domain::session::{IceCandidate, SessionDescription};
use meshcall::domain::shared::ParticipantId;
use meshcall::domain::signaling::{InboundEvent, ParticipantInfo, SignalingChannel, SignalingMessage};
use meshcall::infrastructure::signaling::WebSocketSignalingClient;
use meshcall::interface::api::{build_router, RelayState};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt; // For `oneshot`

async fn start_relay(max_room_size: usize) -> (SocketAddr, Arc<RelayState>) {
    let state = Arc::new(RelayState::new(max_room_size));
    let app = build_router(state.clone(), None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn connect(
    addr: SocketAddr,
    id: &str,
) -> (WebSocketSignalingClient, UnboundedReceiver<InboundEvent>) {
    WebSocketSignalingClient::connect_as(
        &format!("ws://{}/signaling", addr),
        ParticipantId::from(id),
    )
    .await
    .unwrap()
}

async fn next_message(rx: &mut UnboundedReceiver<InboundEvent>) -> SignalingMessage {
    match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        Ok(Some(InboundEvent::Message(message))) => message,
        other => panic!("expected a signaling message, got {:?}", other),
    }
}

fn join(label: &str) -> SignalingMessage {
    SignalingMessage::JoinRoom {
        room: "r1".to_string(),
        display_label: label.to_string(),
    }
}

fn error_code(message: SignalingMessage) -> String {
    match message {
        SignalingMessage::Error { code, .. } => code,
        other => panic!("expected an error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_relay_forwards_negotiation() {
    let (addr, state) = start_relay(0).await;

    let (alice, mut alice_rx) = connect(addr, "a1").await;
    alice.send(join("alice")).unwrap();
    assert_eq!(
        next_message(&mut alice_rx).await,
        SignalingMessage::AllUsers { users: vec![] }
    );

    let (bob, mut bob_rx) = connect(addr, "b1").await;
    bob.send(join("bob")).unwrap();
    assert_eq!(
        next_message(&mut bob_rx).await,
        SignalingMessage::AllUsers {
            users: vec![ParticipantInfo {
                id: ParticipantId::from("a1"),
                display_label: "alice".to_string(),
            }]
        }
    );
    assert_eq!(state.room_members("r1").await.len(), 2);

    // Offer
    alice
        .send(SignalingMessage::Offer {
            sdp: SessionDescription::offer("v=0 alice"),
            sender_id: ParticipantId::from("a1"),
            sender_label: "alice".to_string(),
            receiver_id: ParticipantId::from("b1"),
        })
        .unwrap();
    assert_eq!(
        next_message(&mut bob_rx).await,
        SignalingMessage::GetOffer {
            sdp: SessionDescription::offer("v=0 alice"),
            sender_id: ParticipantId::from("a1"),
            sender_label: "alice".to_string(),
        }
    );

    // Answer
    bob.send(SignalingMessage::Answer {
        sdp: SessionDescription::answer("v=0 bob"),
        sender_id: ParticipantId::from("b1"),
        receiver_id: ParticipantId::from("a1"),
    })
    .unwrap();
    assert_eq!(
        next_message(&mut alice_rx).await,
        SignalingMessage::GetAnswer {
            sdp: SessionDescription::answer("v=0 bob"),
            sender_id: ParticipantId::from("b1"),
        }
    );

    // Candidate
    bob.send(SignalingMessage::Candidate {
        candidate: IceCandidate::new("candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host"),
        sender_id: ParticipantId::from("b1"),
        receiver_id: ParticipantId::from("a1"),
    })
    .unwrap();
    match next_message(&mut alice_rx).await {
        SignalingMessage::GetCandidate {
            candidate,
            sender_id,
            receiver_id,
        } => {
            assert!(candidate.candidate.starts_with("candidate:1"));
            assert_eq!(sender_id.as_str(), "b1");
            assert_eq!(receiver_id.as_str(), "a1");
        }
        other => panic!("unexpected message {:?}", other),
    }

    // Bob leaves
    bob.disconnect();
    assert_eq!(
        next_message(&mut alice_rx).await,
        SignalingMessage::UserExit {
            id: ParticipantId::from("b1"),
        }
    );
    assert_eq!(
        state.room_members("r1").await,
        vec![ParticipantId::from("a1")]
    );
}

#[tokio::test]
async fn test_relay_rejections() {
    let (addr, _state) = start_relay(0).await;

    let (alice, mut alice_rx) = connect(addr, "a1").await;
    alice.send(join("alice")).unwrap();
    next_message(&mut alice_rx).await;

    // Forged sender
    alice
        .send(SignalingMessage::Answer {
            sdp: SessionDescription::answer("v=0"),
            sender_id: ParticipantId::from("z9"),
            receiver_id: ParticipantId::from("a1"),
        })
        .unwrap();
    assert_eq!(error_code(next_message(&mut alice_rx).await), "SENDER_MISMATCH");

    // Nobody to deliver to
    alice
        .send(SignalingMessage::Offer {
            sdp: SessionDescription::offer("v=0"),
            sender_id: ParticipantId::from("a1"),
            sender_label: "alice".to_string(),
            receiver_id: ParticipantId::from("nobody"),
        })
        .unwrap();
    assert_eq!(error_code(next_message(&mut alice_rx).await), "PEER_NOT_FOUND");

    // Relay-only message types are not accepted from clients
    alice
        .send(SignalingMessage::UserExit {
            id: ParticipantId::from("a1"),
        })
        .unwrap();
    assert_eq!(
        error_code(next_message(&mut alice_rx).await),
        "UNEXPECTED_MESSAGE"
    );
}

#[tokio::test]
async fn test_relay_room_full() {
    let (addr, _state) = start_relay(1).await;

    let (alice, mut alice_rx) = connect(addr, "a1").await;
    alice.send(join("alice")).unwrap();
    next_message(&mut alice_rx).await;

    let (bob, mut bob_rx) = connect(addr, "b1").await;
    bob.send(join("bob")).unwrap();
    assert_eq!(error_code(next_message(&mut bob_rx).await), "ROOM_FULL");
}

#[tokio::test]
async fn test_relay_disconnect_is_reported() {
    let (addr, state) = start_relay(0).await;
    let (alice, mut alice_rx) = connect(addr, "a1").await;
    alice.send(join("alice")).unwrap();
    next_message(&mut alice_rx).await;
    assert_eq!(state.connection_count().await, 1);

    alice.disconnect();
    assert!(!alice.is_connected());
    assert!(alice.send(join("alice")).is_err());

    match tokio::time::timeout(Duration::from_secs(5), alice_rx.recv()).await {
        Ok(Some(InboundEvent::Disconnected(_))) => {}
        other => panic!("expected a disconnect, got {:?}", other),
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = Arc::new(RelayState::new(0));
    let app = build_router(state, None);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "ok");
    assert_eq!(json["connections"], 0);
}
