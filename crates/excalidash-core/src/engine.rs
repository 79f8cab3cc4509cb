//! Boundary to the vector-graphics engine that owns the canvas.

use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;

use crate::element::{AppState, Element, SceneSnapshot};
use crate::presence::Collaborator;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Preview rendering failed: {0}")]
    Preview(String),
}

/// What the sync layer needs from the rendering engine.
pub trait SceneEngine {
    /// Every element in the scene, soft-deleted ones included.
    fn scene_elements(&self) -> Vec<Element>;

    /// The engine's full app-state blob.
    fn app_state(&self) -> Value;

    /// Ids the local user is selecting or dragging right now.
    fn selected_element_ids(&self) -> HashSet<String>;

    /// Replace the scene's elements.
    fn update_scene(&mut self, elements: Vec<Element>);

    /// Replace the live collaborator overlay.
    fn update_collaborators(&mut self, collaborators: Vec<Collaborator>);

    /// Render a static preview (e.g. an SVG document) of a scene.
    fn render_preview(&self, scene: &SceneSnapshot) -> Result<String, EngineError>;

    /// Current elements plus the persistable app state.
    fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot::new(self.scene_elements(), AppState::from_engine(&self.app_state()))
    }
}
