//! Sample-based local capture
//!
//! Produces WebRTC sample tracks (Opus audio, VP8 video) that an encoder or a
//! file reader feeds through [`write_sample`]. Muted or stopped tracks swallow
//! samples instead of sending them.

use crate::domain::media::{
    LocalMediaSource, LocalTrack, MediaCapture, MediaConstraints, MediaHandle, TrackKind,
};
use crate::domain::shared::{DomainError, Result};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Opus frame length used for generated audio
pub const OPUS_FRAME: Duration = Duration::from_millis(20);

/// One 20 ms Opus frame of silence
const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];

pub struct SampleCapture {
    stream_id: String,
}

impl SampleCapture {
    pub fn new() -> Self {
        Self {
            stream_id: format!("meshcall-{}", Uuid::new_v4()),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    fn track(&self, kind: TrackKind, capability: RTCRtpCodecCapability) -> LocalTrack {
        let id = kind.to_string();
        let sample_track = Arc::new(TrackLocalStaticSample::new(
            capability,
            id.clone(),
            self.stream_id.clone(),
        ));
        LocalTrack::new(id, kind, MediaHandle::new(sample_track))
    }
}

impl Default for SampleCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MediaCapture for SampleCapture {
    async fn capture(&self, constraints: &MediaConstraints) -> Result<LocalMediaSource> {
        if !constraints.audio && constraints.video.is_none() {
            return Err(DomainError::CaptureFailure(
                "Neither audio nor video requested".to_string(),
            ));
        }

        let mut tracks = Vec::new();

        if constraints.audio {
            tracks.push(self.track(
                TrackKind::Audio,
                RTCRtpCodecCapability {
                    mime_type: "audio/opus".to_string(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
                    rtcp_feedback: vec![],
                },
            ));
        }

        if let Some(video) = constraints.video {
            if video.width == 0 || video.height == 0 {
                return Err(DomainError::CaptureFailure(format!(
                    "Unsupported video size {}x{}",
                    video.width, video.height
                )));
            }
            tracks.push(self.track(
                TrackKind::Video,
                RTCRtpCodecCapability {
                    mime_type: "video/VP8".to_string(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
            ));
            debug!("Video track prepared for {}x{}", video.width, video.height);
        }

        info!(
            "Captured {} local track(s) on stream {}",
            tracks.len(),
            self.stream_id
        );
        Ok(LocalMediaSource::new(tracks))
    }
}

/// Write one encoded sample; returns false when the track is muted or stopped
pub async fn write_sample(track: &LocalTrack, data: Bytes, duration: Duration) -> Result<bool> {
    if !track.is_live() {
        return Ok(false);
    }

    let source = track
        .source()
        .downcast::<TrackLocalStaticSample>()
        .ok_or_else(|| DomainError::Internal(format!("Track {} is not a sample track", track.id())))?;

    source
        .write_sample(&Sample {
            data,
            duration,
            ..Default::default()
        })
        .await
        .map_err(|e| DomainError::Internal(format!("Failed to write sample: {}", e)))?;
    Ok(true)
}

/// Feed Opus silence into an audio track until it is stopped
pub fn spawn_silence(track: LocalTrack) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(OPUS_FRAME);
        while !track.is_stopped() {
            ticker.tick().await;
            if let Err(e) = write_sample(&track, Bytes::from_static(&OPUS_SILENCE), OPUS_FRAME).await {
                warn!("Silence generator stopped: {}", e);
                break;
            }
        }
        debug!("Silence generator for {} finished", track.id());
    })
}
