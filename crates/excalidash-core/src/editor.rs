//! One document's editing lifetime.
//!
//! `EditorSession` is the glue the host drives from its frame loop: it loads the
//! drawing, joins the room, feeds local edits to the relay and the persistence
//! scheduler, and applies whatever arrives from the transport. Nothing here
//! blocks on the network; failures surface as [`Notification`]s.

use std::sync::Arc;
use std::time::Instant;

use kurbo::Point;
use thiserror::Error;

use crate::collaboration::{CollaborationSession, SessionEvent};
use crate::config::SyncConfig;
use crate::document::{Document, DocumentPatch};
use crate::engine::SceneEngine;
use crate::identity::Identity;
use crate::presence::RosterEntry;
use crate::storage::{PersistOutcome, PersistenceScheduler, Storage, StorageError};
use crate::sync::{PointerButton, SyncError, SyncEvent, Transport};

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("Drawing not found: {0}")]
    DocumentNotFound(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("Editor session is closed")]
    Closed,
}

/// Non-blocking status for the host to show (toasts, status bar).
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Connected,
    Disconnected,
    ConnectionError(String),
    Saved { version: u64 },
    SaveFailed(String),
    PreviewFailed(String),
    ServerError(String),
}

pub struct EditorSession<S: Storage, T: Transport> {
    storage: Arc<S>,
    transport: T,
    document: Document,
    collaboration: CollaborationSession,
    persistence: PersistenceScheduler<S>,
    notifications: Vec<Notification>,
    closed: bool,
}

impl<S: Storage, T: Transport> EditorSession<S, T> {
    /// Load `document_id`, hand its elements to the engine and join its room.
    pub async fn open<E: SceneEngine>(
        storage: Arc<S>,
        transport: T,
        identity: Identity,
        document_id: &str,
        config: &SyncConfig,
        engine: &mut E,
    ) -> Result<Self, EditorError> {
        let document = storage.get(document_id).await.map_err(|e| match e {
            StorageError::NotFound(id) => EditorError::DocumentNotFound(id),
            other => EditorError::Storage(other),
        })?;
        log::info!(
            "Opened drawing {} ({} element(s), v{})",
            document.id,
            document.elements.len(),
            document.version
        );

        engine.update_scene(document.elements.clone());

        let mut collaboration = CollaborationSession::new(identity, document.id.clone(), config);
        collaboration.join(&document.elements);
        let persistence = PersistenceScheduler::with_delays(
            storage.clone(),
            document.id.clone(),
            config.save_delay(),
            config.preview_delay(),
        );

        let mut editor = Self {
            storage,
            transport,
            document,
            collaboration,
            persistence,
            notifications: Vec::new(),
            closed: false,
        };
        editor.flush_outgoing();
        Ok(editor)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.collaboration.roster()
    }

    /// The engine reported a scene change.
    pub fn on_scene_change<E: SceneEngine>(&mut self, engine: &E, now: Instant) {
        if self.closed {
            return;
        }
        let snapshot = engine.snapshot();
        self.collaboration.on_scene_change(&snapshot.elements, now);
        self.persistence.schedule(snapshot, now);
        self.flush_outgoing();
    }

    pub fn on_pointer_move<E: SceneEngine>(
        &mut self,
        engine: &E,
        pointer: Point,
        button: PointerButton,
        now: Instant,
    ) {
        if self.closed {
            return;
        }
        let mut selection: Vec<String> = engine.selected_element_ids().into_iter().collect();
        selection.sort();
        self.collaboration.on_pointer_move(pointer, button, selection, now);
        self.flush_outgoing();
    }

    pub fn set_active(&mut self, is_active: bool) {
        if self.closed {
            return;
        }
        self.collaboration.set_active(is_active);
        self.flush_outgoing();
    }

    /// Drive one frame: transport events, due broadcasts, cursor flush, due saves.
    pub async fn tick<E: SceneEngine>(&mut self, now: Instant, engine: &mut E) {
        if self.closed {
            return;
        }

        for event in self.transport.poll_events() {
            match event {
                SyncEvent::Connected => {
                    self.notifications.push(Notification::Connected);
                    self.collaboration.rejoin();
                }
                SyncEvent::Disconnected => {
                    log::info!("Live channel closed for {}", self.document.id);
                    self.notifications.push(Notification::Disconnected);
                }
                SyncEvent::Error { message } => {
                    self.notifications.push(Notification::ConnectionError(message));
                }
                SyncEvent::Message(msg) => {
                    if let Some(SessionEvent::ServerError { message }) =
                        self.collaboration.handle_message(msg, engine)
                    {
                        self.notifications.push(Notification::ServerError(message));
                    }
                }
            }
        }

        self.collaboration.tick(now, engine);
        self.flush_outgoing();

        for outcome in self.persistence.poll(now, engine).await {
            self.record_outcome(outcome);
        }
    }

    /// Write the current scene right away, bypassing the debounce.
    pub async fn save_now<E: SceneEngine>(&mut self, engine: &E) -> Result<Document, EditorError> {
        if self.closed {
            return Err(EditorError::Closed);
        }
        match self.persistence.save_now(engine.snapshot(), engine).await {
            Ok(doc) => {
                self.notifications.push(Notification::Saved { version: doc.version });
                self.document = doc.clone();
                Ok(doc)
            }
            Err(e) => {
                self.notifications.push(Notification::SaveFailed(e.to_string()));
                Err(e.into())
            }
        }
    }

    pub async fn rename(&mut self, name: &str) -> Result<Document, EditorError> {
        if self.closed {
            return Err(EditorError::Closed);
        }
        let doc = self
            .storage
            .update(&self.document.id, DocumentPatch::rename(name))
            .await?;
        self.document.name = doc.name.clone();
        self.document.version = doc.version;
        Ok(doc)
    }

    /// Leave the room and drop every pending timer.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.collaboration.leave();
        self.persistence.cancel();
        self.closed = true;
        log::info!("Closed drawing {}", self.document.id);
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    fn flush_outgoing(&mut self) {
        let messages = self.collaboration.take_outgoing();
        if messages.is_empty() {
            return;
        }
        if !self.transport.is_connected() {
            log::debug!("Dropping {} message(s) while offline", messages.len());
            return;
        }
        for msg in &messages {
            if let Err(e) = self.transport.send(msg) {
                log::warn!("Failed to send message: {}", e);
                self.notifications.push(Notification::ConnectionError(e.to_string()));
                break;
            }
        }
    }

    fn record_outcome(&mut self, outcome: PersistOutcome) {
        let notification = match outcome {
            PersistOutcome::Saved { version } => {
                self.document.version = version;
                Notification::Saved { version }
            }
            PersistOutcome::PreviewSaved { version } => {
                self.document.version = version;
                return;
            }
            PersistOutcome::SaveFailed(e) => Notification::SaveFailed(e.to_string()),
            PersistOutcome::PreviewFailed(e) => Notification::PreviewFailed(e),
        };
        self.notifications.push(notification);
    }
}

impl<S: Storage, T: Transport> Drop for EditorSession<S, T> {
    fn drop(&mut self) {
        self.close();
    }
}
