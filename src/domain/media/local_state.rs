//! Local media state for the duration of one call

use crate::domain::media::track::{LocalTrack, TrackKind};
use tracing::{debug, info};

/// Tracks produced by a successful capture
#[derive(Debug, Clone, Default)]
pub struct LocalMediaSource {
    pub tracks: Vec<LocalTrack>,
}

impl LocalMediaSource {
    pub fn new(tracks: Vec<LocalTrack>) -> Self {
        Self { tracks }
    }
}

/// Owns the outbound tracks shared by every peer session
///
/// Only the room orchestrator mutates it; sessions receive clones of the
/// tracks, which share their flags with the originals.
#[derive(Debug)]
pub struct LocalMediaState {
    tracks: Vec<LocalTrack>,
    released: bool,
}

impl LocalMediaState {
    pub fn new(source: LocalMediaSource) -> Self {
        info!("Local media ready with {} track(s)", source.tracks.len());
        Self {
            tracks: source.tracks,
            released: false,
        }
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    /// Whether any track of the class is currently enabled
    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        self.tracks_of(kind).any(|t| t.is_enabled())
    }

    /// Set the enabled flag on every track of the class, returning how many were touched
    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) -> usize {
        let mut touched = 0;
        for track in self.tracks_of(kind) {
            track.set_enabled(enabled);
            touched += 1;
        }
        debug!("Set {} {} track(s) enabled={}", touched, kind, enabled);
        touched
    }

    /// Flip the class and return the new enabled state
    pub fn toggle(&self, kind: TrackKind) -> bool {
        let enabled = !self.is_enabled(kind);
        self.set_enabled(kind, enabled);
        enabled
    }

    /// Stop every track and drop them
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        for track in &self.tracks {
            track.stop();
        }
        info!("Released {} local track(s)", self.tracks.len());
        self.tracks.clear();
        self.released = true;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for LocalMediaState {
    fn drop(&mut self) {
        self.release();
    }
}
