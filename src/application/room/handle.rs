//! Cloneable control handle for a running room

use crate::application::room::observer::RoomObserver;
use crate::domain::media::TrackKind;
use crate::domain::room::{RemoteParticipant, RoomEvent};
use crate::domain::shared::{DomainError, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// User actions delivered to the room loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCommand {
    ToggleMedia(TrackKind),
    SetMediaEnabled { kind: TrackKind, enabled: bool },
    Leave,
}

#[derive(Clone)]
pub struct RoomHandle {
    commands: mpsc::UnboundedSender<RoomCommand>,
    observer: Arc<RoomObserver>,
}

impl RoomHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<RoomCommand>,
        observer: Arc<RoomObserver>,
    ) -> Self {
        Self { commands, observer }
    }

    pub fn toggle_audio(&self) -> Result<()> {
        self.send(RoomCommand::ToggleMedia(TrackKind::Audio))
    }

    pub fn toggle_video(&self) -> Result<()> {
        self.send(RoomCommand::ToggleMedia(TrackKind::Video))
    }

    pub fn set_audio_enabled(&self, enabled: bool) -> Result<()> {
        self.send(RoomCommand::SetMediaEnabled {
            kind: TrackKind::Audio,
            enabled,
        })
    }

    pub fn set_video_enabled(&self, enabled: bool) -> Result<()> {
        self.send(RoomCommand::SetMediaEnabled {
            kind: TrackKind::Video,
            enabled,
        })
    }

    pub fn leave(&self) -> Result<()> {
        self.send(RoomCommand::Leave)
    }

    pub fn participants(&self) -> watch::Receiver<Vec<RemoteParticipant>> {
        self.observer.subscribe_participants()
    }

    pub fn events(&self) -> broadcast::Receiver<RoomEvent> {
        self.observer.subscribe_events()
    }

    fn send(&self, command: RoomCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| DomainError::Internal("Room loop has stopped".to_string()))
    }
}
