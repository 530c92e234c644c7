/// Room observer: participant list and lifecycle events for the UI layer
use crate::domain::room::{RemoteParticipant, RoomEvent};
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

pub struct RoomObserver {
    participants: watch::Sender<Vec<RemoteParticipant>>,
    events: broadcast::Sender<RoomEvent>,
}

impl RoomObserver {
    /// Create new observer with specified event capacity
    pub fn new(capacity: usize) -> Self {
        let (participants, _) = watch::channel(Vec::new());
        let (events, _) = broadcast::channel(capacity);
        Self {
            participants,
            events,
        }
    }

    /// Subscribe to the remote participant list
    pub fn subscribe_participants(&self) -> watch::Receiver<Vec<RemoteParticipant>> {
        self.participants.subscribe()
    }

    /// Subscribe to lifecycle events
    pub fn subscribe_events(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Current remote participant list
    pub fn participants(&self) -> Vec<RemoteParticipant> {
        self.participants.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub(crate) fn publish_participants(&self, participants: Vec<RemoteParticipant>) {
        trace!("Publishing {} remote participants", participants.len());
        self.participants.send_replace(participants);
    }

    pub(crate) fn notify(&self, event: RoomEvent) {
        let event_type = event.event_type();
        if self.events.send(event).is_err() {
            debug!("No subscribers for room event {}", event_type);
        }
    }
}

impl Default for RoomObserver {
    /// Default capacity (1000 events)
    fn default() -> Self {
        Self::new(1000)
    }
}
