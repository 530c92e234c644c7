//! Media track value objects

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Track class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Opaque handle to an engine-specific media object
///
/// The core never looks inside; the transport engine and the view layer
/// downcast it to the concrete type they know about.
#[derive(Clone)]
pub struct MediaHandle(Arc<dyn Any + Send + Sync>);

impl MediaHandle {
    pub fn new<T: Any + Send + Sync>(inner: Arc<T>) -> Self {
        Self(inner)
    }

    /// Handle with no engine object behind it
    pub fn detached() -> Self {
        Self(Arc::new(()))
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &MediaHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MediaHandle(..)")
    }
}

/// Outbound track produced by local capture
///
/// Clones share the enabled and stopped flags, so every peer session that
/// attached the track observes a mute immediately.
#[derive(Debug, Clone)]
pub struct LocalTrack {
    id: String,
    kind: TrackKind,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    source: MediaHandle,
}

impl LocalTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind, source: MediaHandle) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(AtomicBool::new(false)),
            source,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn source(&self) -> &MediaHandle {
        &self.source
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Whether samples written to this track should reach the wire
    pub fn is_live(&self) -> bool {
        self.is_enabled() && !self.is_stopped()
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether both values refer to the same underlying track
    pub fn same_track(&self, other: &LocalTrack) -> bool {
        Arc::ptr_eq(&self.enabled, &other.enabled)
    }
}

/// Inbound track reported by the transport engine
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    pub handle: MediaHandle,
}

/// Media currently attached for one remote participant
#[derive(Debug, Clone)]
pub struct RemoteMedia {
    pub stream_id: String,
    pub tracks: Vec<RemoteTrack>,
}

impl RemoteMedia {
    /// Build the handle that replaces `previous` once `track` arrives
    ///
    /// A track on the same stream joins the previous tracks (replacing one
    /// with the same id); a track on a different stream starts a new handle.
    pub fn attach(previous: Option<&RemoteMedia>, track: RemoteTrack) -> RemoteMedia {
        let mut tracks = match previous {
            Some(media) if media.stream_id == track.stream_id => media
                .tracks
                .iter()
                .filter(|t| t.id != track.id)
                .cloned()
                .collect(),
            _ => Vec::new(),
        };

        let stream_id = track.stream_id.clone();
        tracks.push(track);

        RemoteMedia { stream_id, tracks }
    }

    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }
}
