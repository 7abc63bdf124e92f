//! Authentication provider contract and in-process implementation.
//!
//! # Responsibility
//! - Expose the current principal whose uid scopes every remote path.
//! - Notify subscribers when the signed-in principal changes.
//!
//! # Invariants
//! - Listeners run after the provider released its lock.
//! - Signing in as the current principal does not notify listeners.

use log::info;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Authenticated user identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Principal {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }
}

/// Sign-in state change callback. Receives the new principal, if any.
pub type AuthStateListener = Arc<dyn Fn(Option<&Principal>) + Send + Sync>;

/// Handle returned by `AuthProvider::add_state_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AuthListenerId(pub u64);

/// Identity source consumed by repositories and sessions.
pub trait AuthProvider: Send + Sync {
    fn current_principal(&self) -> Option<Principal>;
    fn add_state_listener(&self, listener: AuthStateListener) -> AuthListenerId;
    fn remove_state_listener(&self, id: AuthListenerId) -> bool;
}

#[derive(Default)]
struct AuthState {
    principal: Option<Principal>,
    next_listener_id: u64,
    listeners: BTreeMap<AuthListenerId, AuthStateListener>,
}

/// In-process provider driven by explicit sign-in/sign-out calls.
///
/// The host forwards its real identity provider's events here.
#[derive(Default)]
pub struct SessionAuth {
    state: Mutex<AuthState>,
}

impl SessionAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that starts signed in as `principal`.
    pub fn signed_in(principal: Principal) -> Self {
        let auth = Self::new();
        auth.lock().principal = Some(principal);
        auth
    }

    pub fn sign_in(&self, principal: Principal) {
        self.transition(Some(principal));
    }

    pub fn sign_out(&self) {
        self.transition(None);
    }

    fn transition(&self, next: Option<Principal>) {
        let listeners = {
            let mut state = self.lock();
            if state.principal == next {
                return;
            }
            state.principal = next.clone();
            state.listeners.values().cloned().collect::<Vec<_>>()
        };
        info!(
            "event=auth_state module=auth status={} listeners={}",
            if next.is_some() { "signed_in" } else { "signed_out" },
            listeners.len()
        );
        for listener in listeners {
            listener(next.as_ref());
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AuthProvider for SessionAuth {
    fn current_principal(&self) -> Option<Principal> {
        self.lock().principal.clone()
    }

    fn add_state_listener(&self, listener: AuthStateListener) -> AuthListenerId {
        let mut state = self.lock();
        state.next_listener_id += 1;
        let id = AuthListenerId(state.next_listener_id);
        state.listeners.insert(id, listener);
        id
    }

    fn remove_state_listener(&self, id: AuthListenerId) -> bool {
        self.lock().listeners.remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthProvider, AuthStateListener, Principal, SessionAuth};
    use std::sync::{Arc, Mutex};

    #[test]
    fn notifies_on_transitions_only() {
        let auth = SessionAuth::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let listener: AuthStateListener = Arc::new(move |principal| {
            sink.lock()
                .unwrap()
                .push(principal.map(|p| p.uid.clone()));
        });
        let id = auth.add_state_listener(listener);

        auth.sign_in(Principal::new("u1"));
        auth.sign_in(Principal::new("u1"));
        auth.sign_out();
        assert!(auth.remove_state_listener(id));
        auth.sign_in(Principal::new("u2"));

        assert_eq!(
            *events.lock().unwrap(),
            vec![Some("u1".to_string()), None]
        );
        assert_eq!(auth.current_principal().map(|p| p.uid), Some("u2".to_string()));
    }
}
