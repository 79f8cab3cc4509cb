//! ExcaliDash Sync Core
//!
//! Real-time collaboration for the drawing editor: element reconciliation,
//! throttled change relay, presence and cursors, and debounced persistence.

pub mod collaboration;
pub mod config;
pub mod document;
pub mod editor;
pub mod element;
pub mod engine;
pub mod identity;
pub mod presence;
pub mod reconcile;
pub mod relay;
pub mod schedule;
pub mod storage;
pub mod sync;
pub mod version;

pub use collaboration::{CollaborationSession, SessionEvent};
pub use config::SyncConfig;
pub use document::{Document, DocumentPatch};
pub use editor::{EditorError, EditorSession, Notification};
pub use element::{AppState, Element, SceneSnapshot};
pub use engine::{EngineError, SceneEngine};
pub use identity::{Identity, IdentityStore};
pub use presence::{Collaborator, PresenceRoster, RosterEntry};
pub use reconcile::{filter_selected, reconcile};
pub use relay::ChangeRelay;
pub use storage::{FileStorage, MemoryStorage, PersistenceScheduler, Storage, StorageError};
pub use sync::{ClientMessage, ConnectionState, NativeWebSocket, Peer, ServerMessage, SyncEvent, Transport};
pub use version::VersionTracker;
