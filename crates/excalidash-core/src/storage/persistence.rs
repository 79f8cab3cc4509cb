//! Debounced persistence of the local scene.
//!
//! Two independent writers share the same input: a cheap structural save that
//! fires shortly after editing quiets down, and a preview render that waits
//! much longer. Editing never waits on either; failures come back as
//! [`PersistOutcome`] values for the host to surface.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::document::{Document, DocumentPatch};
use crate::element::SceneSnapshot;
use crate::engine::SceneEngine;
use crate::schedule::Debouncer;
use crate::storage::{Storage, StorageError, StorageResult};

/// Quiet time before the structural save.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(1000);

/// Quiet time before the preview is regenerated.
pub const DEFAULT_PREVIEW_DELAY: Duration = Duration::from_millis(10_000);

/// Result of one writer firing.
#[derive(Debug)]
pub enum PersistOutcome {
    Saved { version: u64 },
    PreviewSaved { version: u64 },
    SaveFailed(StorageError),
    PreviewFailed(String),
}

impl PersistOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::SaveFailed(_) | Self::PreviewFailed(_))
    }
}

/// Debounced writers for one document.
///
/// Bound to a single document id for its whole life. Call [`cancel`] before
/// switching documents so nothing pending lands on the old id afterwards.
///
/// [`cancel`]: PersistenceScheduler::cancel
pub struct PersistenceScheduler<S: Storage> {
    storage: Arc<S>,
    document_id: String,
    save: Debouncer<SceneSnapshot>,
    preview: Debouncer<SceneSnapshot>,
}

impl<S: Storage> PersistenceScheduler<S> {
    pub fn new(storage: Arc<S>, document_id: impl Into<String>) -> Self {
        Self::with_delays(storage, document_id, DEFAULT_SAVE_DELAY, DEFAULT_PREVIEW_DELAY)
    }

    pub fn with_delays(
        storage: Arc<S>,
        document_id: impl Into<String>,
        save_delay: Duration,
        preview_delay: Duration,
    ) -> Self {
        Self {
            storage,
            document_id: document_id.into(),
            save: Debouncer::new(save_delay),
            preview: Debouncer::new(preview_delay),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Feed a local change; restarts both quiet windows.
    pub fn schedule(&mut self, snapshot: SceneSnapshot, now: Instant) {
        self.preview.schedule(snapshot.clone(), now);
        self.save.schedule(snapshot, now);
    }

    pub fn is_pending(&self) -> bool {
        self.save.is_pending() || self.preview.is_pending()
    }

    /// Run whichever writers are due.
    pub async fn poll<E: SceneEngine>(&mut self, now: Instant, engine: &E) -> Vec<PersistOutcome> {
        let mut outcomes = Vec::new();

        if let Some(snapshot) = self.save.poll(now) {
            outcomes.push(match self.write_scene(snapshot).await {
                Ok(doc) => PersistOutcome::Saved { version: doc.version },
                Err(e) => PersistOutcome::SaveFailed(e),
            });
        }

        if let Some(snapshot) = self.preview.poll(now) {
            outcomes.push(self.write_preview(&snapshot, engine).await);
        }

        outcomes
    }

    /// Save immediately, bypassing both timers.
    ///
    /// Pending writes are dropped first, so no older snapshot lands after this one.
    /// The preview is refreshed too; a preview failure is logged but does not fail the save.
    pub async fn save_now<E: SceneEngine>(
        &mut self,
        snapshot: SceneSnapshot,
        engine: &E,
    ) -> StorageResult<Document> {
        self.cancel();
        let doc = self.write_scene(snapshot.clone()).await?;
        if let PersistOutcome::PreviewFailed(e) = self.write_preview(&snapshot, engine).await {
            log::warn!("Preview refresh after save failed: {}", e);
        }
        Ok(doc)
    }

    /// Drop both pending writes.
    pub fn cancel(&mut self) {
        self.save.cancel();
        self.preview.cancel();
    }

    async fn write_scene(&self, snapshot: SceneSnapshot) -> StorageResult<Document> {
        let count = snapshot.elements.len();
        let result = self
            .storage
            .update(&self.document_id, DocumentPatch::scene(snapshot))
            .await;
        match &result {
            Ok(doc) => log::debug!("Saved {} element(s) to {} (v{})", count, self.document_id, doc.version),
            Err(e) => log::warn!("Failed to save {}: {}", self.document_id, e),
        }
        result
    }

    async fn write_preview<E: SceneEngine>(&self, snapshot: &SceneSnapshot, engine: &E) -> PersistOutcome {
        let preview = match engine.render_preview(snapshot) {
            Ok(preview) => preview,
            Err(e) => {
                log::warn!("Failed to render preview for {}: {}", self.document_id, e);
                return PersistOutcome::PreviewFailed(e.to_string());
            }
        };
        match self
            .storage
            .update(&self.document_id, DocumentPatch::preview(preview))
            .await
        {
            Ok(doc) => PersistOutcome::PreviewSaved { version: doc.version },
            Err(e) => {
                log::warn!("Failed to store preview for {}: {}", self.document_id, e);
                PersistOutcome::PreviewFailed(e.to_string())
            }
        }
    }
}
