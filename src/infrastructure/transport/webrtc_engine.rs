//! WebRTC transport engine
//!
//! Builds one `RTCPeerConnection` per remote participant and forwards its
//! callbacks to the room loop as transport events.

use crate::domain::media::{LocalTrack, MediaHandle, RemoteTrack, TrackKind};
use crate::domain::session::{IceCandidate, SdpKind, SessionDescription};
use crate::domain::shared::{DomainError, ParticipantId, Result};
use crate::domain::transport::{
    ConnectionState, PeerConnection, TransportEngine, TransportEvent, TransportEventSink,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

pub struct WebRtcEngine {
    api: API,
    ice_servers: Vec<String>,
}

impl WebRtcEngine {
    /// Create engine with default codecs (Opus, VP8, ...) and interceptors
    pub fn new(ice_servers: Vec<String>) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| DomainError::Internal(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(Default::default(), &mut media_engine)
            .map_err(|e| DomainError::Internal(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        Ok(Self { api, ice_servers })
    }

    fn configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self
                .ice_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl TransportEngine for WebRtcEngine {
    async fn create_connection(
        &self,
        participant: &ParticipantId,
        events: TransportEventSink,
    ) -> Result<Arc<dyn PeerConnection>> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(self.configuration())
                .await
                .map_err(|e| DomainError::connection_setup(participant, e))?,
        );

        let sink = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let sink = sink.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("Candidate gathering finished for {}", sink.participant());
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        sink.emit(TransportEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }));
                    }
                    Err(e) => warn!("Failed to serialize local candidate: {}", e),
                }
            })
        }));

        let sink = events.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => return Box::pin(async {}),
                };
                let remote = RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind,
                    handle: MediaHandle::new(track),
                };
                let sink = sink.clone();
                Box::pin(async move {
                    sink.emit(TransportEvent::RemoteTrack(remote));
                })
            },
        ));

        let sink = events;
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let mapped = match state {
                RTCPeerConnectionState::New => ConnectionState::New,
                RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                RTCPeerConnectionState::Connected => ConnectionState::Connected,
                RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                RTCPeerConnectionState::Failed => ConnectionState::Failed,
                RTCPeerConnectionState::Closed => ConnectionState::Closed,
                _ => return Box::pin(async {}),
            };
            sink.emit(TransportEvent::ConnectionStateChanged(mapped));
            Box::pin(async {})
        }));

        info!("Created peer connection for {}", participant);
        Ok(Arc::new(WebRtcConnection {
            participant: participant.clone(),
            pc,
            media_kinds: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct WebRtcConnection {
    participant: ParticipantId,
    pc: Arc<RTCPeerConnection>,
    /// Track classes with a transceiver, sending or receive-only
    media_kinds: Mutex<Vec<TrackKind>>,
    closed: AtomicBool,
}

impl WebRtcConnection {
    fn negotiation(&self, what: &str, error: impl std::fmt::Display) -> DomainError {
        DomainError::negotiation(&self.participant, format!("{}: {}", what, error))
    }

    /// Make sure audio and video are both negotiated even without a local track
    async fn ensure_receivers(&self) -> Result<()> {
        let missing: Vec<TrackKind> = {
            let media_kinds = self
                .media_kinds
                .lock()
                .map_err(|_| DomainError::Internal("track list poisoned".to_string()))?;
            [TrackKind::Audio, TrackKind::Video]
                .into_iter()
                .filter(|kind| !media_kinds.contains(kind))
                .collect()
        };

        for kind in missing {
            let codec_type = match kind {
                TrackKind::Audio => RTPCodecType::Audio,
                TrackKind::Video => RTPCodecType::Video,
            };
            self.pc
                .add_transceiver_from_kind(
                    codec_type,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await
                .map_err(|e| self.negotiation("add receiver", e))?;
            if let Ok(mut media_kinds) = self.media_kinds.lock() {
                media_kinds.push(kind);
            }
            debug!("Added {} receiver for {}", kind, self.participant);
        }
        Ok(())
    }
}

fn to_rtc(description: SessionDescription) -> webrtc::error::Result<RTCSessionDescription> {
    match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
    }
}

#[async_trait::async_trait]
impl PeerConnection for WebRtcConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.ensure_receivers().await?;
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| self.negotiation("create offer", e))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| self.negotiation("create answer", e))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc(description).map_err(|e| self.negotiation("parse local description", e))?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(|e| self.negotiation("set local description", e))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc(description).map_err(|e| self.negotiation("parse remote description", e))?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| self.negotiation("set remote description", e))
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await
            .map_err(|e| self.negotiation("add candidate", e))
    }

    async fn add_local_track(&self, track: &LocalTrack) -> Result<()> {
        let source = track
            .source()
            .downcast::<TrackLocalStaticSample>()
            .ok_or_else(|| {
                DomainError::connection_setup(
                    &self.participant,
                    format!("track {} has no WebRTC source", track.id()),
                )
            })?;

        let sender = self
            .pc
            .add_track(source as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| DomainError::connection_setup(&self.participant, e))?;

        // Drain RTCP so the interceptors keep running
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });

        if let Ok(mut media_kinds) = self.media_kinds.lock() {
            media_kinds.push(track.kind());
        }
        debug!("Attached {} track {} for {}", track.kind(), track.id(), self.participant);
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pc = self.pc.clone();
        let participant = self.participant.clone();
        tokio::spawn(async move {
            match pc.close().await {
                Ok(()) => info!("Closed peer connection for {}", participant),
                Err(e) => warn!("Failed to close peer connection for {}: {}", participant, e),
            }
        });
    }
}
