//! Client side of a live editing session.
//!
//! `CollaborationSession` owns every per-document cache the sync layer needs
//! (version tracker, cursor buffer, roster) and lives exactly as long as the
//! user is editing one document. It never touches the network itself: outgoing
//! messages are queued for the host to send, incoming ones are handed in.

use std::time::Instant;

use kurbo::Point;

use crate::config::SyncConfig;
use crate::element::Element;
use crate::engine::SceneEngine;
use crate::identity::Identity;
use crate::presence::{Collaborator, CursorBuffer, PresenceRoster, RosterEntry};
use crate::reconcile::{filter_selected, reconcile, winning_ids};
use crate::relay::ChangeRelay;
use crate::schedule::{FlushTicker, RateLimiter};
use crate::sync::{
    parse_server_message, ClientMessage, CursorMove, ElementUpdate, PointerButton, ServerMessage,
};

/// Something the host may want to react to after an incoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Remote elements were merged into the scene.
    ElementsApplied { count: usize },
    /// The roster changed.
    PresenceChanged,
    /// The server rejected one of our messages.
    ServerError { message: String },
}

/// Live sync state for one document.
pub struct CollaborationSession {
    identity: Identity,
    document_id: String,
    joined: bool,
    is_active: bool,
    relay: ChangeRelay,
    cursor_limiter: RateLimiter,
    cursor_buffer: CursorBuffer,
    cursor_flush: FlushTicker,
    roster: PresenceRoster,
    outgoing: Vec<ClientMessage>,
}

impl CollaborationSession {
    pub fn new(identity: Identity, document_id: impl Into<String>, config: &SyncConfig) -> Self {
        let document_id = document_id.into();
        Self {
            relay: ChangeRelay::new(
                document_id.clone(),
                identity.id.clone(),
                config.element_broadcast_interval(),
            ),
            roster: PresenceRoster::new(identity.id.clone()),
            identity,
            document_id,
            joined: false,
            is_active: true,
            cursor_limiter: RateLimiter::new(config.cursor_interval()),
            cursor_buffer: CursorBuffer::new(),
            cursor_flush: FlushTicker::new(config.cursor_flush_interval()),
            outgoing: Vec::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    // --- Room ---

    /// Join the document's room, treating `initial` as the shared starting point.
    pub fn join(&mut self, initial: &[Element]) {
        self.relay.seed(initial);
        self.joined = true;
        self.queue_join();
    }

    /// Re-announce ourselves after the transport reconnects.
    pub fn rejoin(&mut self) {
        if self.joined {
            self.queue_join();
        }
    }

    fn queue_join(&mut self) {
        log::info!("Joining room {} as {}", self.document_id, self.identity.name);
        self.outgoing.push(ClientMessage::JoinRoom {
            document_id: self.document_id.clone(),
            user: self.identity.clone(),
        });
    }

    /// Tear down all live state. Pending broadcasts and buffered cursors are dropped.
    pub fn leave(&mut self) {
        if self.joined {
            log::info!("Leaving room {}", self.document_id);
        }
        self.joined = false;
        self.relay.cancel();
        self.cursor_buffer.clear();
        self.roster.clear();
        self.outgoing.clear();
    }

    // --- Outgoing ---

    /// Feed the full local scene after a local change.
    pub fn on_scene_change(&mut self, elements: &[Element], now: Instant) {
        if !self.joined {
            return;
        }
        if let Some(update) = self.relay.broadcast_changes(elements, now) {
            self.outgoing.push(ClientMessage::ElementUpdate(update));
        }
    }

    /// Local pointer moved. Sent only if the per-sender rate cap allows it.
    pub fn on_pointer_move(
        &mut self,
        pointer: Point,
        button: PointerButton,
        selection: Vec<String>,
        now: Instant,
    ) {
        if !self.joined || !self.cursor_limiter.try_acquire(now) {
            return;
        }
        self.outgoing.push(ClientMessage::CursorMove(CursorMove {
            document_id: self.document_id.clone(),
            user_id: self.identity.id.clone(),
            pointer,
            button,
            selection,
            color: self.identity.color.clone(),
        }));
    }

    /// Focus/blur or pointer enter/leave. Only actual changes are sent.
    pub fn set_active(&mut self, is_active: bool) {
        if self.is_active == is_active {
            return;
        }
        self.is_active = is_active;
        if self.joined {
            self.outgoing.push(ClientMessage::UserActivity {
                document_id: self.document_id.clone(),
                is_active,
            });
        }
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    // --- Timers ---

    /// Run due timers: the trailing element broadcast and the cursor flush.
    pub fn tick<E: SceneEngine>(&mut self, now: Instant, engine: &mut E) {
        if let Some(update) = self.relay.poll(now, || engine.scene_elements()) {
            self.outgoing.push(ClientMessage::ElementUpdate(update));
        }

        if self.cursor_flush.due(now) && !self.cursor_buffer.is_empty() {
            let samples = self.cursor_buffer.drain();
            if self.roster.apply_cursors(samples) {
                engine.update_collaborators(self.roster.overlay());
            }
        }
    }

    // --- Incoming ---

    /// Handle a raw frame. Malformed frames are dropped.
    pub fn handle_text<E: SceneEngine>(&mut self, text: &str, engine: &mut E) -> Option<SessionEvent> {
        let msg = parse_server_message(text)?;
        self.handle_message(msg, engine)
    }

    /// Handle an incoming server message.
    pub fn handle_message<E: SceneEngine>(
        &mut self,
        msg: ServerMessage,
        engine: &mut E,
    ) -> Option<SessionEvent> {
        if !self.joined {
            return None;
        }

        match msg {
            ServerMessage::ElementUpdate(update) => self.apply_remote(update, engine),
            ServerMessage::CursorMove(sample) => {
                if sample.document_id == self.document_id {
                    self.cursor_buffer.push(sample);
                }
                None
            }
            ServerMessage::PresenceUpdate { peers } => {
                if self.roster.apply_presence(peers) {
                    engine.update_collaborators(self.roster.overlay());
                }
                Some(SessionEvent::PresenceChanged)
            }
            ServerMessage::UserActivity {
                document_id,
                user_id,
                is_active,
            } => {
                if document_id != self.document_id {
                    return None;
                }
                if self.roster.apply_activity(&user_id, is_active) {
                    engine.update_collaborators(self.roster.overlay());
                }
                Some(SessionEvent::PresenceChanged)
            }
            ServerMessage::Error { message } => {
                log::warn!("Server error: {}", message);
                Some(SessionEvent::ServerError { message })
            }
        }
    }

    fn apply_remote<E: SceneEngine>(&mut self, update: ElementUpdate, engine: &mut E) -> Option<SessionEvent> {
        if update.document_id != self.document_id || update.sender_id == self.identity.id {
            return None;
        }

        let tracker = self.relay.tracker();
        let fresh: Vec<Element> = update
            .elements
            .into_iter()
            .filter(|el| tracker.has_changed(el))
            .collect();
        let remote = filter_selected(fresh, &engine.selected_element_ids());
        if remote.is_empty() {
            return None;
        }

        let local = engine.scene_elements();
        let winners = winning_ids(&local, &remote);
        if winners.is_empty() {
            return None;
        }

        let merged = reconcile(&local, &remote);
        self.relay
            .acknowledge(merged.iter().filter(|el| winners.contains(&el.id)));
        log::debug!(
            "Applied {} remote element(s) from {}",
            winners.len(),
            update.sender_id
        );
        engine.update_scene(merged);
        Some(SessionEvent::ElementsApplied { count: winners.len() })
    }

    // --- Presence ---

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.roster.roster()
    }

    pub fn collaborators(&self) -> Vec<Collaborator> {
        self.roster.overlay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeEngine;
    use crate::sync::Peer;
    use serde_json::json;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.into(),
            name: format!("user-{id}"),
            initials: "UU".into(),
            color: "#22c55e".into(),
        }
    }

    fn session(id: &str, scene: &[Element]) -> CollaborationSession {
        let mut s = CollaborationSession::new(identity(id), "doc", &SyncConfig::default());
        s.join(scene);
        s.take_outgoing();
        s
    }

    fn el(id: &str, version: u64, nonce: u32) -> Element {
        let mut e = Element::new(id);
        e.version = version;
        e.version_nonce = nonce;
        e
    }

    fn update_from(sender: &str, elements: Vec<Element>) -> ServerMessage {
        ServerMessage::ElementUpdate(ElementUpdate {
            document_id: "doc".into(),
            elements,
            sender_id: sender.into(),
        })
    }

    fn element_updates(msgs: Vec<ClientMessage>) -> Vec<ElementUpdate> {
        msgs.into_iter()
            .filter_map(|m| match m {
                ClientMessage::ElementUpdate(u) => Some(u),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_join_queues_join_room() {
        let mut s = CollaborationSession::new(identity("me"), "doc", &SyncConfig::default());
        s.join(&[]);
        let out = s.take_outgoing();
        assert!(matches!(&out[..], [ClientMessage::JoinRoom { document_id, .. }] if document_id == "doc"));
        assert!(!s.has_outgoing());
    }

    #[test]
    fn test_remote_update_applied_and_not_echoed() {
        let t0 = Instant::now();
        let scene = vec![el("a", 1, 1)];
        let mut engine = FakeEngine::with_elements(scene.clone());
        let mut s = session("me", &scene);

        let event = s.handle_message(update_from("peer", vec![el("a", 2, 5)]), &mut engine);
        assert_eq!(event, Some(SessionEvent::ElementsApplied { count: 1 }));
        assert_eq!(engine.element("a").version, 2);

        // The applied element is not a local change.
        s.on_scene_change(&engine.scene_elements(), t0);
        assert!(s.take_outgoing().is_empty());
    }

    #[test]
    fn test_own_and_foreign_document_updates_ignored() {
        let mut engine = FakeEngine::with_elements(vec![el("a", 1, 1)]);
        let mut s = session("me", &engine.elements.clone());

        assert!(s.handle_message(update_from("me", vec![el("a", 9, 1)]), &mut engine).is_none());
        let other_doc = ServerMessage::ElementUpdate(ElementUpdate {
            document_id: "other".into(),
            elements: vec![el("a", 9, 1)],
            sender_id: "peer".into(),
        });
        assert!(s.handle_message(other_doc, &mut engine).is_none());
        assert_eq!(engine.element("a").version, 1);
        assert_eq!(engine.scene_updates, 0);
    }

    #[test]
    fn test_stale_remote_update_not_applied() {
        let mut engine = FakeEngine::with_elements(vec![el("a", 5, 1)]);
        let mut s = session("me", &engine.elements.clone());
        assert!(s.handle_message(update_from("peer", vec![el("a", 4, 99)]), &mut engine).is_none());
        assert_eq!(engine.element("a").version, 5);
    }

    #[test]
    fn test_selection_guard() {
        let mut engine = FakeEngine::with_elements(vec![el("e", 1, 1)]);
        let mut s = session("me", &engine.elements.clone());
        engine.selection.insert("e".into());

        let remote = el("e", 2, 7).with_field("x", json!(100));
        assert!(s.handle_message(update_from("peer", vec![remote.clone()]), &mut engine).is_none());
        assert_eq!(engine.element("e").version, 1);

        engine.selection.clear();
        s.handle_message(update_from("peer", vec![remote]), &mut engine);
        assert_eq!(engine.element("e").version, 2);
        assert_eq!(engine.element("e").payload["x"], json!(100));
    }

    #[test]
    fn test_conflicting_edits_converge() {
        let base = vec![el("a", 4, 1)];
        let mut engine1 = FakeEngine::with_elements(base.clone());
        let mut engine2 = FakeEngine::with_elements(base.clone());
        let mut s1 = session("c1", &base);
        let mut s2 = session("c2", &base);

        let x = el("a", 5, 100).with_field("shape", json!("x"));
        let y = el("a", 5, 200).with_field("shape", json!("y"));
        engine1.elements = vec![x.clone()];
        engine2.elements = vec![y.clone()];

        let t0 = Instant::now();
        s1.on_scene_change(&engine1.scene_elements(), t0);
        s2.on_scene_change(&engine2.scene_elements(), t0);
        let from1 = element_updates(s1.take_outgoing());
        let from2 = element_updates(s2.take_outgoing());

        s1.handle_message(ServerMessage::ElementUpdate(from2[0].clone()), &mut engine1);
        s2.handle_message(ServerMessage::ElementUpdate(from1[0].clone()), &mut engine2);

        assert_eq!(engine1.element("a").payload["shape"], json!("y"));
        assert_eq!(engine2.element("a").payload["shape"], json!("y"));
    }

    #[test]
    fn test_deletion_reaches_peer() {
        let base = vec![el("a", 1, 1), el("b", 1, 1)];
        let mut engine1 = FakeEngine::with_elements(base.clone());
        let mut engine2 = FakeEngine::with_elements(base.clone());
        let mut s1 = session("c1", &base);
        let mut s2 = session("c2", &base);

        engine1.element_mut("b").mark_deleted();
        s1.on_scene_change(&engine1.scene_elements(), Instant::now());
        let updates = element_updates(s1.take_outgoing());
        assert_eq!(updates[0].elements.len(), 1);
        assert!(updates[0].elements[0].is_deleted);

        s2.handle_message(ServerMessage::ElementUpdate(updates[0].clone()), &mut engine2);
        assert!(engine2.element("b").is_deleted);
        assert_eq!(engine2.elements.len(), 2);
    }

    #[test]
    fn test_cursor_rate_cap() {
        let t0 = Instant::now();
        let mut s = session("me", &[]);
        for i in 0..10 {
            s.on_pointer_move(Point::new(i as f64, 0.0), PointerButton::Up, vec![], t0 + ms(i * 10));
        }
        // Samples at 0 and 50 pass, everything else is dropped.
        let sent = s.take_outgoing();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[1], ClientMessage::CursorMove(c) if c.pointer.x == 5.0 && c.color == "#22c55e"));
    }

    #[test]
    fn test_incoming_cursors_flushed_once_per_tick() {
        let t0 = Instant::now();
        let mut engine = FakeEngine::default();
        let mut s = session("me", &[]);
        s.handle_message(
            ServerMessage::PresenceUpdate {
                peers: vec![Peer::from_identity(identity("p1"))],
            },
            &mut engine,
        );

        for i in 0..30 {
            s.handle_message(
                ServerMessage::CursorMove(CursorMove {
                    document_id: "doc".into(),
                    user_id: "p1".into(),
                    pointer: Point::new(i as f64, 1.0),
                    button: PointerButton::Down,
                    selection: vec![],
                    color: "#f00".into(),
                }),
                &mut engine,
            );
        }
        assert_eq!(engine.overlay_updates, 0);

        s.tick(t0, &mut engine);
        assert_eq!(engine.overlay_updates, 1);
        assert_eq!(engine.collaborators.len(), 1);
        assert_eq!(engine.collaborators[0].pointer.x, 29.0);
        assert_eq!(engine.collaborators[0].username, "user-p1");

        s.tick(t0 + ms(5), &mut engine);
        assert_eq!(engine.overlay_updates, 1);
    }

    #[test]
    fn test_presence_inactive_peer_has_no_cursor() {
        let t0 = Instant::now();
        let mut engine = FakeEngine::default();
        let mut s = session("me", &[]);
        let mut p2 = Peer::from_identity(identity("p2"));
        p2.is_active = false;
        s.handle_message(
            ServerMessage::PresenceUpdate {
                peers: vec![Peer::from_identity(identity("p1")), p2],
            },
            &mut engine,
        );
        for user in ["p1", "p2"] {
            s.handle_message(
                ServerMessage::CursorMove(CursorMove {
                    document_id: "doc".into(),
                    user_id: user.into(),
                    pointer: Point::new(1.0, 1.0),
                    button: PointerButton::Up,
                    selection: vec![],
                    color: "#f00".into(),
                }),
                &mut engine,
            );
        }
        s.tick(t0, &mut engine);

        let ids: Vec<_> = engine.collaborators.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["p1"]);
        let roster = s.roster();
        assert_eq!(roster.len(), 2);
        assert!(roster.iter().any(|e| e.peer.id == "p2" && e.dimmed));
    }

    #[test]
    fn test_activity_only_sent_on_change() {
        let mut s = session("me", &[]);
        s.set_active(true);
        assert!(s.take_outgoing().is_empty());
        s.set_active(false);
        s.set_active(false);
        let out = s.take_outgoing();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], ClientMessage::UserActivity { is_active: false, .. }));
    }

    #[test]
    fn test_malformed_text_dropped() {
        let mut engine = FakeEngine::with_elements(vec![el("a", 1, 1)]);
        let mut s = session("me", &engine.elements.clone());
        assert!(s.handle_text("{\"type\":\"element-update\",\"elements\":7}", &mut engine).is_none());
        assert!(s.handle_text("garbage", &mut engine).is_none());
        assert_eq!(engine.element("a").version, 1);
    }

    #[test]
    fn test_leave_drops_pending_broadcast() {
        let t0 = Instant::now();
        let mut scene = vec![el("a", 1, 1)];
        let mut s = session("me", &scene);
        let mut engine = FakeEngine::default();

        scene[0].touch();
        s.on_scene_change(&scene, t0);
        scene[0].touch();
        s.on_scene_change(&scene, t0 + ms(10));
        s.take_outgoing();

        s.leave();
        s.tick(t0 + ms(500), &mut engine);
        assert!(s.take_outgoing().is_empty());
        assert!(!s.is_joined());
    }

    #[test]
    fn test_remote_merge_inside_throttle_window_not_echoed() {
        let t0 = Instant::now();
        let base = vec![el("a", 1, 1), el("b", 1, 1)];
        let mut engine = FakeEngine::with_elements(base.clone());
        let mut s = session("me", &base);

        engine.element_mut("a").touch();
        s.on_scene_change(&engine.scene_elements(), t0);
        engine.element_mut("a").touch();
        s.on_scene_change(&engine.scene_elements(), t0 + ms(10));
        assert_eq!(element_updates(s.take_outgoing()).len(), 1);

        let applied = s.handle_message(update_from("peer", vec![el("b", 5, 9)]), &mut engine);
        assert_eq!(applied, Some(SessionEvent::ElementsApplied { count: 1 }));

        s.tick(t0 + ms(100), &mut engine);
        let trailing = element_updates(s.take_outgoing());
        assert_eq!(trailing.len(), 1);
        let sent: Vec<_> = trailing[0]
            .elements
            .iter()
            .map(|e| (e.id.as_str(), e.version))
            .collect();
        assert_eq!(sent, vec![("a", 3)]);
        assert_eq!(engine.element("b").version, 5);

        // Later local edits still do not send the remote revision back.
        engine.element_mut("a").touch();
        s.on_scene_change(&engine.scene_elements(), t0 + ms(300));
        let later = element_updates(s.take_outgoing());
        assert!(later.iter().flat_map(|u| &u.elements).all(|e| e.id != "b"));
    }
}
