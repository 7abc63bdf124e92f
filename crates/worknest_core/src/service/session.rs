//! Signed-in workspace session.
//!
//! # Responsibility
//! - Own every domain repository for one principal.
//! - End itself when the principal signs out or changes.
//!
//! # Invariants
//! - Ending is idempotent; repositories are torn down exactly once.
//! - After the session ended no listener of it stays attached to the store
//!   or the auth provider.

use crate::auth::{AuthListenerId, AuthProvider, AuthStateListener, Principal};
use crate::config::{ConfigError, RepositoryConfig};
use crate::repo::{
    BoardRepository, MessageRepository, NoteRepository, SessionScoped, UserRepository,
};
use crate::store::DocumentStore;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug)]
pub enum SessionError {
    NotAuthenticated,
    Config(ConfigError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "cannot start a session without a principal"),
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotAuthenticated => None,
            Self::Config(err) => Some(err),
        }
    }
}

impl From<ConfigError> for SessionError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

struct SessionInner {
    principal: Principal,
    auth: Arc<dyn AuthProvider>,
    auth_listener: Mutex<Option<AuthListenerId>>,
    active: AtomicBool,
    boards: BoardRepository,
    notes: Arc<NoteRepository>,
    users: UserRepository,
    messages: MessageRepository,
}

impl SessionInner {
    fn end(&self, reason: &str) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let listener = self
            .auth_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = listener {
            self.auth.remove_state_listener(id);
        }

        let repos: [&dyn SessionScoped; 4] =
            [&self.boards, &*self.notes, &self.users, &self.messages];
        for repo in repos {
            repo.teardown();
        }
        info!("event=session_end module=service status=ok reason={reason}");
    }
}

/// Repositories of one signed-in principal.
///
/// Dropping the session ends it.
pub struct WorkspaceSession {
    inner: Arc<SessionInner>,
}

impl WorkspaceSession {
    /// Starts a session for the currently signed-in principal.
    ///
    /// # Errors
    /// - `NotAuthenticated` when nobody is signed in.
    pub fn start(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        config: RepositoryConfig,
    ) -> SessionResult<Self> {
        let principal = auth
            .current_principal()
            .ok_or(SessionError::NotAuthenticated)?;

        let notes = Arc::new(NoteRepository::new(
            Arc::clone(&store),
            Arc::clone(&auth),
            config,
        ));
        let inner = Arc::new(SessionInner {
            boards: BoardRepository::new(Arc::clone(&store), Arc::clone(&auth), config)
                .with_notes(Arc::clone(&notes)),
            notes,
            users: UserRepository::new(Arc::clone(&store), Arc::clone(&auth), config),
            messages: MessageRepository::new(store, Arc::clone(&auth), config),
            principal,
            auth: Arc::clone(&auth),
            auth_listener: Mutex::new(None),
            active: AtomicBool::new(true),
        });

        let weak = Arc::downgrade(&inner);
        let uid = inner.principal.uid.clone();
        let listener: AuthStateListener = Arc::new(move |next| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match next {
                None => inner.end("signed_out"),
                Some(principal) if principal.uid != uid => inner.end("principal_changed"),
                Some(_) => {}
            }
        });
        let listener_id = auth.add_state_listener(listener);
        *inner
            .auth_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener_id);

        // The principal may have changed between the check and the registration.
        let still_current = auth
            .current_principal()
            .is_some_and(|current| current.uid == inner.principal.uid);
        if !still_current {
            inner.end("principal_changed");
            return Err(SessionError::NotAuthenticated);
        }

        info!("event=session_start module=service status=ok");
        Ok(Self { inner })
    }

    /// Like `start`, with the repository config given as JSON.
    pub fn start_with_config_json(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        config_json: &str,
    ) -> SessionResult<Self> {
        let config = RepositoryConfig::from_json(config_json)?;
        Self::start(store, auth, config)
    }

    /// Tears down every repository and detaches from the auth provider.
    pub fn end(&self) {
        self.inner.end("explicit");
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Principal the session was started for.
    pub fn principal(&self) -> &Principal {
        &self.inner.principal
    }

    pub fn boards(&self) -> &BoardRepository {
        &self.inner.boards
    }

    pub fn notes(&self) -> &NoteRepository {
        &self.inner.notes
    }

    pub fn users(&self) -> &UserRepository {
        &self.inner.users
    }

    pub fn messages(&self) -> &MessageRepository {
        &self.inner.messages
    }
}

impl Drop for WorkspaceSession {
    fn drop(&mut self) {
        self.inner.end("dropped");
    }
}
