use meshcall::config::Config;
use meshcall::interface::api::{build_router, init_metrics, RelayState};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting meshcall signaling relay");

    let config = Config::load()?;

    // Initialize metrics
    let prometheus_handle = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    let state = Arc::new(RelayState::new(config.relay.max_room_size));
    let app = build_router(state, prometheus_handle);

    let address = config.relay_bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Relay listening on {}", address);
    info!("  WebSocket: ws://{}/signaling/{{participant_id}}", address);
    info!("  Health:    http://{}/health", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down relay");
        })
        .await?;

    Ok(())
}
