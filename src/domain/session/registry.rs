//! Peer registry
//!
//! Owned arena of peer sessions with a participant-id index. The registry is
//! the single source of truth for who is currently connected and never holds
//! more than one live session per participant.

use crate::domain::session::peer_session::PeerSession;
use crate::domain::shared::{ParticipantId, SessionKey};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    session: Option<PeerSession>,
}

#[derive(Debug, Default)]
pub struct PeerRegistry {
    slots: Vec<Slot>,
    free: Vec<usize>,
    index: HashMap<ParticipantId, SessionKey>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, participant_id: &ParticipantId) -> Option<&PeerSession> {
        let key = self.index.get(participant_id)?;
        self.get_by_key(*key)
    }

    pub fn key_of(&self, participant_id: &ParticipantId) -> Option<SessionKey> {
        self.index.get(participant_id).copied()
    }

    /// Look up by key; stale keys (slot reused or emptied) resolve to nothing
    pub fn get_by_key(&self, key: SessionKey) -> Option<&PeerSession> {
        self.slots
            .get(key.slot)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.session.as_ref())
    }

    pub fn get_by_key_mut(&mut self, key: SessionKey) -> Option<&mut PeerSession> {
        self.slots
            .get_mut(key.slot)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.session.as_mut())
    }

    /// Store a session, closing and evicting any prior session for the same participant
    ///
    /// Returns the key of the stored session and the evicted one, already closed.
    pub fn put(&mut self, session: PeerSession) -> (SessionKey, Option<PeerSession>) {
        let participant_id = session.participant_id().clone();
        let evicted = self.remove(&participant_id);

        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };

        let entry = &mut self.slots[slot];
        entry.session = Some(session);
        let key = SessionKey {
            slot,
            generation: entry.generation,
        };
        self.index.insert(participant_id.clone(), key);

        debug!("Registry stored session {} at {}", participant_id, key);
        (key, evicted)
    }

    /// Close and evict the participant's session
    pub fn remove(&mut self, participant_id: &ParticipantId) -> Option<PeerSession> {
        let key = self.index.remove(participant_id)?;
        let entry = self.slots.get_mut(key.slot)?;
        let mut session = entry.session.take()?;

        entry.generation += 1;
        self.free.push(key.slot);

        session.close();
        debug!("Registry evicted session {}", participant_id);
        Some(session)
    }

    /// Close and evict every session
    pub fn remove_all(&mut self) -> Vec<PeerSession> {
        let participants: Vec<ParticipantId> = self.index.keys().cloned().collect();
        participants
            .iter()
            .filter_map(|participant_id| self.remove(participant_id))
            .collect()
    }

    pub fn contains(&self, participant_id: &ParticipantId) -> bool {
        self.index.contains_key(participant_id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &PeerSession> {
        self.slots.iter().filter_map(|slot| slot.session.as_ref())
    }
}
