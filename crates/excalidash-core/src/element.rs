//! Scene elements as seen by the sync layer.
//!
//! The rendering engine owns the shape schema. The sync layer only reads the
//! stable id, the `(version, versionNonce)` pair and the soft-delete flag; all
//! other fields ride along untouched in [`Element::payload`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A single drawing element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// Stable identifier, unchanged across edits.
    pub id: String,
    /// Incremented on every local mutation.
    #[serde(default)]
    pub version: u64,
    /// Random tie-breaker, reassigned on every mutation.
    #[serde(default)]
    pub version_nonce: u32,
    /// Soft-delete flag. Deleted elements stay in the set so the deletion can propagate.
    #[serde(default, rename = "isDeleted", alias = "deleted")]
    pub is_deleted: bool,
    /// Engine-owned shape data.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Element {
    /// Create a fresh element at version 1.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 1,
            version_nonce: random_nonce(),
            is_deleted: false,
            payload: Map::new(),
        }
    }

    /// Attach an engine payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// The pair that identifies this revision of the element.
    pub fn version_key(&self) -> (u64, u32) {
        (self.version, self.version_nonce)
    }

    /// Whether this revision wins over `other` under the last-writer-wins rule.
    ///
    /// Higher version wins; on equal versions the higher nonce wins.
    pub fn supersedes(&self, other: &Element) -> bool {
        self.version_key() > other.version_key()
    }

    /// Record a local mutation: bump the version and draw a new nonce.
    pub fn touch(&mut self) {
        self.version += 1;
        self.version_nonce = random_nonce();
    }

    /// Set a payload field as a local mutation.
    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.payload.insert(key.into(), value);
        self.touch();
    }

    /// Soft-delete as a local mutation.
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
        self.touch();
    }
}

/// Draw a random nonce.
///
/// Uses the v4 UUID generator so nonces differ across clients.
pub fn random_nonce() -> u32 {
    let bits = Uuid::new_v4().as_u128();
    (bits ^ (bits >> 64)) as u32
}

/// The part of the engine's app state worth persisting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_size: Option<u32>,
}

impl AppState {
    /// Pick the persistable subset out of the engine's full app-state blob.
    pub fn from_engine(state: &Value) -> Self {
        Self {
            view_background_color: state
                .get("viewBackgroundColor")
                .and_then(Value::as_str)
                .map(str::to_string),
            grid_size: state
                .get("gridSize")
                .and_then(Value::as_u64)
                .and_then(|size| u32::try_from(size).ok()),
        }
    }
}

/// Full local scene at one instant: every element (deleted included) plus app state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSnapshot {
    pub elements: Vec<Element>,
    pub app_state: AppState,
}

impl SceneSnapshot {
    pub fn new(elements: Vec<Element>, app_state: AppState) -> Self {
        Self { elements, app_state }
    }
}
