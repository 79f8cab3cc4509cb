//! HTTP access to stored drawings.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use excalidash_core::document::{Document, DocumentPatch};
use excalidash_core::storage::{FileStorage, StorageError, StorageResult};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::AppState;

#[derive(Debug)]
pub struct ApiError(StorageError);

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StorageError::NotFound(_) => StatusCode::NOT_FOUND,
            other => {
                warn!("Storage failure: {}", other);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NewDrawing {
    pub name: String,
}

/// Run a blocking file-store operation off the async workers.
async fn with_storage<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&FileStorage) -> StorageResult<T> + Send + 'static,
{
    let storage = state.storage.clone();
    tokio::task::spawn_blocking(move || op(storage.as_ref()))
        .await
        .map_err(|e| ApiError(StorageError::Other(format!("Storage task failed: {}", e))))?
        .map_err(ApiError)
}

pub async fn list_drawings(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let mut ids = with_storage(&state, |storage| storage.list_ids()).await?;
    ids.sort();
    Ok(Json(ids))
}

pub async fn create_drawing(
    State(state): State<AppState>,
    Json(body): Json<NewDrawing>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let doc = with_storage(&state, move |storage| {
        storage.create_document(Document::new(body.name))
    })
    .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn get_drawing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    let doc = with_storage(&state, move |storage| storage.read_document(&id)).await?;
    Ok(Json(doc))
}

pub async fn update_drawing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<DocumentPatch>,
) -> Result<Json<Document>, ApiError> {
    let doc = with_storage(&state, move |storage| storage.update_document(&id, patch)).await?;
    Ok(Json(doc))
}
