//! Room registry and fan-out.
//!
//! A room is keyed by document id and lists its live connections in join order.
//! Each member carries the sender half of its connection task's outbox; relaying
//! is plain iteration over the other members. The registry never sees drawing
//! content beyond what it forwards.

use dashmap::DashMap;
use excalidash_core::identity::Identity;
use excalidash_core::sync::{ClientMessage, Peer, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

struct Member {
    conn_id: String,
    peer: Peer,
    tx: Outbox,
}

#[derive(Default)]
struct Room {
    members: Vec<Member>,
}

#[derive(Default)]
pub struct RoomCoordinator {
    rooms: DashMap<String, Room>,
    /// connection id -> room id
    memberships: DashMap<String, String>,
}

impl RoomCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one message from a connection.
    pub fn handle(&self, conn_id: &str, msg: ClientMessage, tx: &Outbox) {
        match msg {
            ClientMessage::JoinRoom { document_id, user } => {
                self.join(conn_id, &document_id, user, tx.clone());
            }
            ClientMessage::UserActivity { document_id, is_active } => {
                if self.joined_room(conn_id, &document_id) {
                    self.set_activity(conn_id, is_active);
                }
            }
            ClientMessage::CursorMove(cursor) => {
                let room_id = cursor.document_id.clone();
                if self.joined_room(conn_id, &room_id) {
                    self.relay_to_others(&room_id, conn_id, ServerMessage::CursorMove(cursor));
                }
            }
            ClientMessage::ElementUpdate(update) => {
                let room_id = update.document_id.clone();
                if self.joined_room(conn_id, &room_id) {
                    self.relay_to_others(&room_id, conn_id, ServerMessage::ElementUpdate(update));
                }
            }
        }
    }

    fn joined_room(&self, conn_id: &str, room_id: &str) -> bool {
        let joined = self
            .memberships
            .get(conn_id)
            .is_some_and(|room| room.value() == room_id);
        if !joined {
            debug!("Ignoring message from {} for unjoined room {}", conn_id, room_id);
        }
        joined
    }

    /// Add a connection to a room, leaving its previous room first.
    pub fn join(&self, conn_id: &str, room_id: &str, user: Identity, tx: Outbox) {
        self.leave(conn_id);

        info!("{} ({}) joined room {}", user.name, conn_id, room_id);
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .members
            .push(Member {
                conn_id: conn_id.to_string(),
                peer: Peer::from_identity(user),
                tx,
            });
        self.memberships
            .insert(conn_id.to_string(), room_id.to_string());

        self.broadcast_presence(room_id);
    }

    /// Remove a connection from its room. Empty rooms are discarded.
    pub fn leave(&self, conn_id: &str) {
        let Some((_, room_id)) = self.memberships.remove(conn_id) else {
            return;
        };

        let now_empty = match self.rooms.get_mut(&room_id) {
            Some(mut room) => {
                room.members.retain(|m| m.conn_id != conn_id);
                room.members.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.rooms.remove_if(&room_id, |_, room| room.members.is_empty());
            info!("Room {} is empty, discarded", room_id);
        } else {
            info!("{} left room {}", conn_id, room_id);
            self.broadcast_presence(&room_id);
        }
    }

    /// Update a member's activity, tell the others and refresh everyone's roster.
    pub fn set_activity(&self, conn_id: &str, is_active: bool) {
        let Some(room_id) = self.memberships.get(conn_id).map(|r| r.value().clone()) else {
            return;
        };

        let user_id = {
            let Some(mut room) = self.rooms.get_mut(&room_id) else {
                return;
            };
            let Some(member) = room.members.iter_mut().find(|m| m.conn_id == conn_id) else {
                return;
            };
            if member.peer.is_active == is_active {
                return;
            }
            member.peer.is_active = is_active;
            member.peer.id.clone()
        };

        self.relay_to_others(
            &room_id,
            conn_id,
            ServerMessage::UserActivity {
                document_id: room_id.clone(),
                user_id,
                is_active,
            },
        );
        self.broadcast_presence(&room_id);
    }

    /// Send to every member of the room except the originating connection.
    pub fn relay_to_others(&self, room_id: &str, from: &str, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            for member in room.members.iter().filter(|m| m.conn_id != from) {
                let _ = member.tx.send(msg.clone());
            }
        }
    }

    /// Send the full member list to every member.
    pub fn broadcast_presence(&self, room_id: &str) {
        if let Some(room) = self.rooms.get(room_id) {
            let peers: Vec<Peer> = room.members.iter().map(|m| m.peer.clone()).collect();
            let msg = ServerMessage::PresenceUpdate { peers };
            for member in &room.members {
                let _ = member.tx.send(msg.clone());
            }
        }
    }

    pub fn peers(&self, room_id: &str) -> Vec<Peer> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.iter().map(|m| m.peer.clone()).collect())
            .unwrap_or_default()
    }

    pub fn room_of(&self, conn_id: &str) -> Option<String> {
        self.memberships.get(conn_id).map(|r| r.value().clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
