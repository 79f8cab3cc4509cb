//! Durable document storage.
//!
//! The sync layer only depends on `get` and `update`; both are atomic at the
//! record level. `update` is a full overwrite of the fields it carries, so
//! concurrent writers race and the last arrival wins.

mod file;
mod memory;
mod persistence;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use persistence::{
    PersistOutcome, PersistenceScheduler, DEFAULT_PREVIEW_DELAY, DEFAULT_SAVE_DELAY,
};

use crate::document::{Document, DocumentPatch};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for storage operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for document storage backends.
pub trait Storage: Send + Sync {
    /// Fetch a document.
    fn get(&self, id: &str) -> BoxFuture<'_, StorageResult<Document>>;

    /// Apply a partial update and return the stored result.
    fn update(&self, id: &str, patch: DocumentPatch) -> BoxFuture<'_, StorageResult<Document>>;

    /// Insert a new document, replacing any with the same id.
    fn create(&self, document: Document) -> BoxFuture<'_, StorageResult<Document>>;

    /// Delete a document. Deleting a missing document is not an error.
    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// List all document ids.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;
}

/// Minimal executor for driving storage futures in tests.
#[cfg(test)]
pub(crate) fn block_on<F: std::future::Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
            return result;
        }
    }
}
