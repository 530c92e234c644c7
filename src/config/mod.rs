//! Configuration management
//!
//! Layered: built-in defaults, then `meshcall.toml` (or the file named by
//! `MESHCALL_CONFIG`), then `MESHCALL__SECTION__KEY` environment variables.

use crate::application::RoomSettings;
use crate::domain::media::{MediaConstraints, VideoConstraints};
use crate::domain::shared::{DomainError, Result, RoomId};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "meshcall.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub signaling: SignalingConfig,
    pub room: RoomConfig,
    pub media: MediaConfig,
    pub transport: TransportConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Relay WebSocket base URL; the participant id is appended as a path segment
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub name: String,
    pub display_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub audio: bool,
    pub video: bool,
    pub video_width: u32,
    pub video_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub ice_servers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Zero means unlimited
    pub max_room_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signaling: SignalingConfig {
                url: "ws://127.0.0.1:8080/signaling".to_string(),
            },
            room: RoomConfig {
                name: "lobby".to_string(),
                display_label: "guest".to_string(),
            },
            media: MediaConfig {
                audio: true,
                video: true,
                video_width: 480,
                video_height: 480,
            },
            transport: TransportConfig {
                ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            },
            relay: RelayConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                max_room_size: 0,
            },
        }
    }
}

impl Config {
    /// Load from defaults, the config file and the environment
    pub fn load() -> Result<Self> {
        let (path, required) = match std::env::var("MESHCALL_CONFIG") {
            Ok(path) => (PathBuf::from(path), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let builder = Self::defaults()?
            .add_source(File::from(path).required(required))
            .add_source(
                Environment::with_prefix("MESHCALL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("transport.ice_servers")
                    .try_parsing(true),
            );
        Self::finish(builder)
    }

    /// Defaults overlaid with a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let builder = Self::defaults()?.add_source(File::from_str(text, FileFormat::Toml));
        Self::finish(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let defaults = config::Config::try_from(&Config::default()).map_err(config_error)?;
        Ok(config::Config::builder().add_source(defaults))
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.signaling.url.trim().is_empty() {
            return Err(DomainError::Config("signaling.url must not be empty".to_string()));
        }
        RoomId::parse(&self.room.name).map_err(DomainError::Config)?;
        if self.media.video && (self.media.video_width == 0 || self.media.video_height == 0) {
            return Err(DomainError::Config(format!(
                "media video size must be non-zero, got {}x{}",
                self.media.video_width, self.media.video_height
            )));
        }
        Ok(())
    }

    pub fn media_constraints(&self) -> MediaConstraints {
        MediaConstraints {
            audio: self.media.audio,
            video: self.media.video.then_some(VideoConstraints {
                width: self.media.video_width,
                height: self.media.video_height,
            }),
        }
    }

    pub fn room_settings(&self) -> Result<RoomSettings> {
        Ok(RoomSettings {
            room: RoomId::parse(&self.room.name).map_err(DomainError::Config)?,
            display_label: self.room.display_label.clone(),
            constraints: self.media_constraints(),
        })
    }

    pub fn relay_bind_address(&self) -> String {
        format!("{}:{}", self.relay.host, self.relay.port)
    }
}

fn config_error(error: config::ConfigError) -> DomainError {
    DomainError::Config(error.to_string())
}
