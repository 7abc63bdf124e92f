//! Repository layer: optimistic caches over the remote document store.
//!
//! # Responsibility
//! - Provide the generic optimistic collection engine.
//! - Expose domain repositories (boards, notes, users, messages) as thin
//!   path-addressing wrappers around it.
//!
//! # Invariants
//! - Every remote path is scoped under `users/{uid}` of the current principal.
//! - Entity validation runs before any local or remote mutation.
//! - Repository APIs return semantic errors (`NotFound`, `NotAuthenticated`)
//!   in addition to store transport errors.

pub mod board_repo;
pub mod error;
pub mod message_repo;
pub mod note_repo;
pub mod optimistic;
pub mod user_repo;

pub use board_repo::BoardRepository;
pub use error::{RepoError, RepoResult};
pub use message_repo::MessageRepository;
pub use note_repo::NoteRepository;
pub use optimistic::{CollectionObserver, CollectionStatus, ObserverId, OptimisticCollection};
pub use user_repo::UserRepository;

use crate::auth::{AuthProvider, Principal};

/// State owned by one signed-in session, released at sign-out.
pub trait SessionScoped: Send + Sync {
    /// Detaches listeners and drops every cached item.
    fn teardown(&self);
}

pub(crate) fn current_principal(auth: &dyn AuthProvider) -> RepoResult<Principal> {
    auth.current_principal().ok_or(RepoError::NotAuthenticated)
}

pub(crate) fn relative_path(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|segment| segment.to_string()).collect()
}
