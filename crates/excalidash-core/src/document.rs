//! Stored drawing record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::element::{AppState, Element, SceneSnapshot};

/// A drawing as held by durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    /// Full element list in z-order, soft-deleted elements included.
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub app_state: AppState,
    /// Incremented on every update.
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    /// Rendered preview of the scene.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create an empty drawing.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            elements: Vec::new(),
            app_state: AppState::default(),
            version: 1,
            collection_id: None,
            preview: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_elements(mut self, elements: Vec<Element>) -> Self {
        self.elements = elements;
        self
    }

    /// Apply a partial update, bumping the version.
    pub fn apply(&mut self, patch: DocumentPatch) {
        let DocumentPatch {
            name,
            elements,
            app_state,
            collection_id,
            preview,
        } = patch;
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(elements) = elements {
            self.elements = elements;
        }
        if let Some(app_state) = app_state {
            self.app_state = app_state;
        }
        if let Some(collection_id) = collection_id {
            self.collection_id = Some(collection_id);
        }
        if let Some(preview) = preview {
            self.preview = Some(preview);
        }
        self.version += 1;
        self.updated_at = Utc::now();
    }

    pub fn scene(&self) -> SceneSnapshot {
        SceneSnapshot::new(self.elements.clone(), self.app_state.clone())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Fields to overwrite in an update. `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<Element>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_state: Option<AppState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl DocumentPatch {
    /// Structural save: full element list plus persisted app state.
    pub fn scene(snapshot: SceneSnapshot) -> Self {
        Self {
            elements: Some(snapshot.elements),
            app_state: Some(snapshot.app_state),
            ..Self::default()
        }
    }

    pub fn preview(preview: String) -> Self {
        Self {
            preview: Some(preview),
            ..Self::default()
        }
    }

    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}
