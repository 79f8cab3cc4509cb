//! In-memory storage implementation.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use crate::document::{Document, DocumentPatch};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory storage for tests and ephemeral servers.
#[derive(Default)]
pub struct MemoryStorage {
    documents: RwLock<HashMap<String, Document>>,
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error(e: impl std::fmt::Display) -> StorageError {
        StorageError::Other(format!("Lock error: {}", e))
    }
}

impl Storage for MemoryStorage {
    fn get(&self, id: &str) -> BoxFuture<'_, StorageResult<Document>> {
        let id = id.to_string();
        Box::pin(async move {
            let docs = self.documents.read().map_err(Self::lock_error)?;
            docs.get(&id).cloned().ok_or(StorageError::NotFound(id))
        })
    }

    fn update(&self, id: &str, patch: DocumentPatch) -> BoxFuture<'_, StorageResult<Document>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut docs = self.documents.write().map_err(Self::lock_error)?;
            let doc = docs.get_mut(&id).ok_or(StorageError::NotFound(id))?;
            doc.apply(patch);
            Ok(doc.clone())
        })
    }

    fn create(&self, document: Document) -> BoxFuture<'_, StorageResult<Document>> {
        Box::pin(async move {
            let mut docs = self.documents.write().map_err(Self::lock_error)?;
            docs.insert(document.id.clone(), document.clone());
            Ok(document)
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut docs = self.documents.write().map_err(Self::lock_error)?;
            docs.remove(&id);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            let docs = self.documents.read().map_err(Self::lock_error)?;
            Ok(docs.keys().cloned().collect())
        })
    }
}
