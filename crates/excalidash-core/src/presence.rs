//! Peer presence and live cursors.
//!
//! Cursor samples arrive at network cadence; they are buffered per sender and
//! drained into the engine overlay at a fixed flush cadence, so a burst of
//! samples costs at most one overlay update per flush.

use std::collections::HashMap;

use kurbo::Point;

use crate::sync::{CursorMove, Peer, PointerButton};

/// A remote peer as drawn by the engine's collaborator overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct Collaborator {
    pub id: String,
    pub username: String,
    pub initials: String,
    pub color: String,
    pub pointer: Point,
    pub button: PointerButton,
    pub selected_element_ids: Vec<String>,
}

/// Roster line for the presence list.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub peer: Peer,
    /// Present but idle.
    pub dimmed: bool,
}

/// Latest cursor sample per sender. Last write wins, nothing is queued.
#[derive(Debug, Default)]
pub struct CursorBuffer {
    pending: HashMap<String, CursorMove>,
}

impl CursorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: CursorMove) {
        self.pending.insert(sample.user_id.clone(), sample);
    }

    pub fn drain(&mut self) -> Vec<CursorMove> {
        self.pending.drain().map(|(_, sample)| sample).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Who is in the room and whose cursor is on screen.
#[derive(Debug)]
pub struct PresenceRoster {
    local_id: String,
    peers: Vec<Peer>,
    cursors: HashMap<String, Collaborator>,
}

impl PresenceRoster {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            peers: Vec::new(),
            cursors: HashMap::new(),
        }
    }

    fn peer(&self, id: &str) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == id)
    }

    /// Replace the roster with the server's full member list.
    ///
    /// Cursors of peers that left or went inactive are removed from the overlay.
    /// Returns true if the overlay changed.
    pub fn apply_presence(&mut self, peers: Vec<Peer>) -> bool {
        self.peers = peers;
        let before = self.cursors.len();
        let peers = &self.peers;
        self.cursors
            .retain(|id, _| peers.iter().any(|p| &p.id == id && p.is_active));
        self.cursors.len() != before
    }

    /// Apply a single peer's activity change. Returns true if the overlay changed.
    pub fn apply_activity(&mut self, user_id: &str, is_active: bool) -> bool {
        if let Some(peer) = self.peers.iter_mut().find(|p| p.id == user_id) {
            peer.is_active = is_active;
        }
        !is_active && self.cursors.remove(user_id).is_some()
    }

    /// Fold drained cursor samples into the overlay. Returns true if anything changed.
    pub fn apply_cursors(&mut self, samples: Vec<CursorMove>) -> bool {
        let mut changed = false;
        for sample in samples {
            if sample.user_id == self.local_id {
                continue;
            }
            let (username, initials) = match self.peer(&sample.user_id) {
                Some(peer) if !peer.is_active => continue,
                Some(peer) => (peer.name.clone(), peer.initials.clone()),
                None => (String::new(), String::new()),
            };
            let collaborator = Collaborator {
                id: sample.user_id.clone(),
                username,
                initials,
                color: sample.color,
                pointer: sample.pointer,
                button: sample.button,
                selected_element_ids: sample.selection,
            };
            if self.cursors.get(&sample.user_id) != Some(&collaborator) {
                self.cursors.insert(sample.user_id, collaborator);
                changed = true;
            }
        }
        changed
    }

    /// Collaborators whose cursors should be drawn, sorted by id.
    pub fn overlay(&self) -> Vec<Collaborator> {
        let mut out: Vec<Collaborator> = self.cursors.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Everyone in the room except the local user, inactive peers dimmed.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.peers
            .iter()
            .filter(|p| p.id != self.local_id)
            .map(|p| RosterEntry {
                peer: p.clone(),
                dimmed: !p.is_active,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
        self.cursors.clear();
    }
}
