//! File-based storage.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use crate::document::{Document, DocumentPatch};
use std::fs;
use std::future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;

/// Stores each document as a pretty-printed JSON file in one directory.
///
/// Writes are serialized per storage instance, so an `update` reads, patches
/// and replaces its record without interleaving with another writer. Each write
/// goes through its own temp file and an atomic rename.
///
/// All file I/O is blocking; async callers on a runtime should run the
/// `*_document` methods on a blocking thread.
pub struct FileStorage {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Create a new file storage with the given base directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self {
            base_path,
            write_lock: Mutex::new(()),
        })
    }

    /// `<data dir>/excalidash/drawings/`
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;

        Self::new(base.join("excalidash").join("drawings"))
    }

    fn document_path(&self, id: &str) -> PathBuf {
        let safe_id: String = id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{}.json", safe_id))
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| StorageError::Other(format!("Storage lock poisoned: {}", e)))
    }

    pub fn read_document(&self, id: &str) -> StorageResult<Document> {
        self.read(&self.document_path(id), id)
    }

    pub fn update_document(&self, id: &str, patch: DocumentPatch) -> StorageResult<Document> {
        let path = self.document_path(id);
        let _guard = self.lock()?;
        let mut doc = self.read(&path, id)?;
        doc.apply(patch);
        self.write(&path, &doc)?;
        Ok(doc)
    }

    pub fn create_document(&self, document: Document) -> StorageResult<Document> {
        let path = self.document_path(&document.id);
        let _guard = self.lock()?;
        self.write(&path, &document)?;
        Ok(document)
    }

    pub fn delete_document(&self, id: &str) -> StorageResult<()> {
        let path = self.document_path(id);
        let _guard = self.lock()?;
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
            })?;
        }
        Ok(())
    }

    pub fn list_ids(&self) -> StorageResult<Vec<String>> {
        if !self.base_path.exists() {
            return Ok(vec![]);
        }

        let entries = fs::read_dir(&self.base_path)
            .map_err(|e| StorageError::Io(format!("Failed to read directory: {}", e)))?;

        let mut ids = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        Ok(ids)
    }

    fn read(&self, path: &Path, id: &str) -> StorageResult<Document> {
        if !path.exists() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        let json = fs::read_to_string(path).map_err(|e| {
            StorageError::Io(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Document::from_json(&json).map_err(|e| {
            StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    fn write(&self, path: &Path, document: &Document) -> StorageResult<()> {
        let json = document
            .to_json()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let mut tmp = NamedTempFile::new_in(&self.base_path)
            .map_err(|e| StorageError::Io(format!("Failed to create temp file: {}", e)))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", path.display(), e)))?;
        tmp.persist(path).map_err(|e| {
            StorageError::Io(format!("Failed to replace {}: {}", path.display(), e.error))
        })?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, id: &str) -> BoxFuture<'_, StorageResult<Document>> {
        Box::pin(future::ready(self.read_document(id)))
    }

    fn update(&self, id: &str, patch: DocumentPatch) -> BoxFuture<'_, StorageResult<Document>> {
        Box::pin(future::ready(self.update_document(id, patch)))
    }

    fn create(&self, document: Document) -> BoxFuture<'_, StorageResult<Document>> {
        Box::pin(future::ready(self.create_document(document)))
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(future::ready(self.delete_document(id)))
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(future::ready(self.list_ids()))
    }
}
