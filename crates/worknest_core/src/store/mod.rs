//! Remote document store contract and bundled implementations.
//!
//! # Responsibility
//! - Define the document database surface consumed by repositories:
//!   CRUD, atomic batches and live collection listeners.
//! - Provide an in-memory store (tests, CLI) and a SQLite store (device).
//!
//! # Invariants
//! - Collections list documents in creation order.
//! - Deleting a missing document succeeds.
//! - `listen` delivers the current snapshot before returning, then one
//!   snapshot after every committed write to the same collection.
//! - Listeners are never invoked while the store holds an internal lock.

use crate::db::DbError;
use crate::model::DocumentData;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

mod listeners;
pub mod memory;
pub mod path;
pub mod sqlite;

pub use memory::InMemoryDocumentStore;
pub use path::CollectionPath;
pub use sqlite::SqliteDocumentStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level failure (transport, missing document, bad path, codec).
#[derive(Debug)]
pub enum StoreError {
    Unavailable(String),
    NotFound { path: String, id: String },
    AlreadyExists { path: String, id: String },
    InvalidPath(String),
    Serialization(serde_json::Error),
    Db(DbError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
            Self::NotFound { path, id } => write!(f, "document not found: {path}/{id}"),
            Self::AlreadyExists { path, id } => write!(f, "document already exists: {path}/{id}"),
            Self::InvalidPath(message) => write!(f, "invalid store path: {message}"),
            Self::Serialization(err) => write!(f, "document codec error: {err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serialization(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// One stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: DocumentData,
}

/// Full contents of one collection at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    pub path: CollectionPath,
    pub documents: Vec<Document>,
}

/// Write included in an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Set {
        path: CollectionPath,
        id: String,
        data: DocumentData,
    },
    Update {
        path: CollectionPath,
        id: String,
        fields: DocumentData,
    },
    Delete {
        path: CollectionPath,
        id: String,
    },
}

impl BatchOp {
    pub fn path(&self) -> &CollectionPath {
        match self {
            Self::Set { path, .. } | Self::Update { path, .. } | Self::Delete { path, .. } => path,
        }
    }
}

/// Store call kind, used for fault injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreOperation {
    Create,
    Get,
    List,
    Update,
    Set,
    Delete,
    Batch,
    Listen,
}

/// Live collection listener callback.
pub type SnapshotListener = Arc<dyn Fn(&CollectionSnapshot) + Send + Sync>;

/// Handle returned by `DocumentStore::listen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Remote document database consumed by repositories.
pub trait DocumentStore: Send + Sync {
    /// Creates a document. Uses `id_hint` as the document id when given,
    /// otherwise the store assigns one.
    fn create(
        &self,
        path: &CollectionPath,
        id_hint: Option<&str>,
        data: DocumentData,
    ) -> StoreResult<Document>;
    /// Reads one document; `Ok(None)` when it does not exist.
    fn get(&self, path: &CollectionPath, id: &str) -> StoreResult<Option<Document>>;
    /// Lists a collection in creation order.
    fn list(&self, path: &CollectionPath) -> StoreResult<Vec<Document>>;
    /// Merges `fields` into an existing document.
    fn update(&self, path: &CollectionPath, id: &str, fields: DocumentData)
        -> StoreResult<Document>;
    /// Creates or fully replaces one document.
    fn set(&self, path: &CollectionPath, id: &str, data: DocumentData) -> StoreResult<Document>;
    /// Deletes one document. Missing documents are not an error.
    fn delete(&self, path: &CollectionPath, id: &str) -> StoreResult<()>;
    /// Applies all writes atomically, or none of them.
    fn commit_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()>;
    /// Attaches a live listener to one collection.
    fn listen(&self, path: &CollectionPath, listener: SnapshotListener) -> StoreResult<ListenerId>;
    /// Detaches a listener. Returns whether it was attached.
    fn unlisten(&self, id: ListenerId) -> bool;
}

pub(crate) fn merge_fields(target: &mut DocumentData, fields: DocumentData) {
    for (key, value) in fields {
        target.insert(key, value);
    }
}
