//! Core domain logic for WorkNest.
//! Owns entity records, optimistic repositories and the session lifecycle;
//! host UIs call into it through `worknest_ffi`.

pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use auth::{AuthProvider, Principal, SessionAuth};
pub use config::{ConfigError, DeleteFailurePolicy, RepositoryConfig};
pub use logging::{init_logging, logging_status, LogConfig, LogLevel, LoggingError};
pub use model::board::{Board, Checklist, Note, NoteList};
pub use model::conversation::{Conversation, Message};
pub use model::user::{Friendship, FriendshipStatus, User};
pub use model::{Entity, ValidationError};
pub use repo::{
    BoardRepository, CollectionStatus, MessageRepository, NoteRepository, OptimisticCollection,
    RepoError, RepoResult, UserRepository,
};
pub use service::session::{SessionError, SessionResult, WorkspaceSession};
pub use store::{
    CollectionPath, DocumentStore, InMemoryDocumentStore, SqliteDocumentStore, StoreError,
    StoreOperation,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
