use meshcall::application::RoomOrchestrator;
use meshcall::config::Config;
use meshcall::domain::media::TrackKind;
use meshcall::domain::room::RoomEvent;
use meshcall::infrastructure::media::{spawn_silence, SampleCapture};
use meshcall::infrastructure::signaling::WebSocketSignalingClient;
use meshcall::infrastructure::transport::WebRtcEngine;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting meshcall client");

    // Load configuration
    let config = Config::load()?;
    let settings = config.room_settings()?;
    info!(
        "Configuration loaded: room={} relay={}",
        settings.room, config.signaling.url
    );

    let (signaling, inbound) = WebSocketSignalingClient::connect(&config.signaling.url).await?;
    let engine = WebRtcEngine::new(config.transport.ice_servers.clone())?;
    let capture = SampleCapture::new();

    let mut room = RoomOrchestrator::new(
        settings,
        Arc::new(signaling),
        Arc::new(engine),
        Arc::new(capture),
    );
    let handle = room.handle();
    let mut events = handle.events();

    room.join().await?;

    // No microphone here; keep the audio track busy with silence
    let generators: Vec<_> = room
        .local_media()
        .map(|media| media.tracks_of(TrackKind::Audio).cloned().collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .map(spawn_silence)
        .collect();

    let room_task = tokio::spawn(room.run(inbound));

    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RoomEvent::PeerFailed {
                    participant_id,
                    error,
                }) => warn!("Peer {} failed: {}", participant_id, error),
                Ok(RoomEvent::Error { message }) => error!("{}", message),
                Ok(RoomEvent::Left) => {
                    info!("Left the room");
                    break;
                }
                Ok(event) => info!("[{}] {:?}", event.event_type(), event),
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} room event(s)", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, leaving the room");
    if let Err(e) = handle.leave() {
        warn!("Room already stopped: {}", e);
    }

    room_task.await?;
    let _ = logger.await;
    for generator in generators {
        generator.abort();
    }

    info!("meshcall client stopped");
    Ok(())
}
