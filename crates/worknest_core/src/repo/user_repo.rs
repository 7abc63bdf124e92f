//! User profile and friendship repository.
//!
//! # Responsibility
//! - Cache the principal's own profile document `users/{uid}`.
//! - Manage the friendship collection `users/{uid}/friendships`.
//!
//! # Invariants
//! - The profile cell only ever holds the current principal's profile.
//! - Profile updates are optimistic and restore the prior profile on failure.
//! - A principal cannot befriend itself or request the same friend twice.

use crate::auth::AuthProvider;
use crate::config::RepositoryConfig;
use crate::model::user::{Friendship, FriendshipStatus, User};
use crate::model::{
    check_patch_fields, decode_entity, encode_entity, now_epoch_ms, patch_entity, DocumentData,
    Entity, ValidationError,
};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::optimistic::OptimisticCollection;
use crate::repo::{current_principal, relative_path, SessionScoped};
use crate::store::path::USERS_COLLECTION;
use crate::store::{CollectionPath, DocumentStore};
use log::{error, info};
use serde_json::{json, Value};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Default)]
struct ProfileCell {
    owner: Option<String>,
    user: Option<User>,
}

/// Profile and friends of the signed-in principal.
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    profile: RwLock<ProfileCell>,
    friendships: OptimisticCollection<Friendship>,
}

impl UserRepository {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        config: RepositoryConfig,
    ) -> Self {
        let friendships = OptimisticCollection::new(
            Arc::clone(&store),
            Arc::clone(&auth),
            relative_path(&["friendships"]),
            config,
        );
        Self {
            store,
            auth,
            profile: RwLock::new(ProfileCell::default()),
            friendships,
        }
    }

    /// Fetches the profile document; `None` when it does not exist yet.
    pub fn load_profile(&self) -> RepoResult<Option<User>> {
        let principal = current_principal(self.auth.as_ref())?;
        let document = self.store.get(&users_path()?, &principal.uid)?;
        let user = document
            .map(|document| decode_entity::<User>(&document.id, &document.data))
            .transpose()?;
        self.store_profile(&principal.uid, user.clone());
        Ok(user)
    }

    /// Cached profile of the current principal.
    pub fn profile(&self) -> Option<User> {
        let uid = self.auth.current_principal()?.uid;
        let cell = self.profile.read().unwrap_or_else(PoisonError::into_inner);
        if cell.owner.as_deref() != Some(uid.as_str()) {
            return None;
        }
        cell.user.clone()
    }

    /// Returns the profile, creating it from the principal on first sign-in.
    pub fn ensure_profile(&self) -> RepoResult<User> {
        if let Some(user) = self.load_profile()? {
            return Ok(user);
        }
        let principal = current_principal(self.auth.as_ref())?;
        let user = User {
            email: principal.email.clone(),
            display_name: principal.display_name.clone(),
            created_at: Some(now_epoch_ms()),
            ..User::default()
        };
        user.validate()?;
        let document = self
            .store
            .set(&users_path()?, &principal.uid, encode_entity(&user)?)?;
        let user = decode_entity::<User>(&document.id, &document.data)?;
        self.store_profile(&principal.uid, Some(user.clone()));
        info!("event=profile_create module=repo status=ok");
        Ok(user)
    }

    /// Patches one profile field optimistically.
    ///
    /// The profile must have been loaded first.
    pub fn update_profile_field(&self, field: &str, value: Value) -> RepoResult<User> {
        let principal = current_principal(self.auth.as_ref())?;
        let mut fields = DocumentData::new();
        fields.insert(field.to_string(), value);
        check_patch_fields::<User>(&fields)?;

        let prior = {
            let mut cell = self.profile.write().unwrap_or_else(PoisonError::into_inner);
            let current = match (&cell.owner, &cell.user) {
                (Some(owner), Some(user)) if *owner == principal.uid => user.clone(),
                _ => return Err(RepoError::NotFound(principal.uid.clone())),
            };
            let patched = patch_entity(&current, &fields)?;
            patched.validate()?;
            cell.user = Some(patched);
            current
        };

        let outcome = self
            .store
            .update(&users_path()?, &principal.uid, fields)
            .map_err(RepoError::from)
            .and_then(|document| {
                decode_entity::<User>(&document.id, &document.data).map_err(RepoError::from)
            });

        let mut cell = self.profile.write().unwrap_or_else(PoisonError::into_inner);
        let current_owner = cell.owner.as_deref() == Some(principal.uid.as_str());
        match outcome {
            Ok(user) => {
                if current_owner {
                    cell.user = Some(user.clone());
                }
                info!("event=profile_update module=repo status=ok field={field}");
                Ok(user)
            }
            Err(err) => {
                if current_owner {
                    cell.user = Some(prior);
                }
                error!(
                    "event=profile_update module=repo status=rolled_back field={field} error={err}"
                );
                Err(err)
            }
        }
    }

    /// Requests friendship with `friend_uid`.
    pub fn send_friend_request(
        &self,
        friend_uid: &str,
        friend_name: Option<&str>,
    ) -> RepoResult<Friendship> {
        let principal = current_principal(self.auth.as_ref())?;
        let friend_uid = friend_uid.trim();
        if friend_uid == principal.uid {
            return Err(ValidationError::InvalidField {
                entity: Friendship::KIND,
                field: "friend_uid",
                reason: "cannot befriend yourself".to_string(),
            }
            .into());
        }
        let known = self
            .friendships
            .items()
            .iter()
            .any(|friendship| friendship.friend_uid.as_deref() == Some(friend_uid));
        if known {
            return Err(ValidationError::InvalidField {
                entity: Friendship::KIND,
                field: "friend_uid",
                reason: "friendship already exists".to_string(),
            }
            .into());
        }
        self.friendships.create(Friendship::request(
            friend_uid,
            friend_name.map(str::to_string),
        ))
    }

    pub fn accept_friend_request(&self, friendship_id: &str) -> RepoResult<Friendship> {
        self.friendships
            .update_field(friendship_id, "status", json!(FriendshipStatus::Accepted))
    }

    pub fn remove_friend(&self, friendship_id: &str) -> RepoResult<()> {
        self.friendships.delete(friendship_id)
    }

    pub fn friends(&self) -> Vec<Friendship> {
        self.friendships.items()
    }

    pub fn subscribe_friends(&self) -> RepoResult<()> {
        self.friendships.subscribe()
    }

    pub fn refresh_friends_if_empty(&self) -> RepoResult<bool> {
        self.friendships.refresh_if_empty()
    }

    pub fn friendship_collection(&self) -> &OptimisticCollection<Friendship> {
        &self.friendships
    }

    fn store_profile(&self, uid: &str, user: Option<User>) {
        let mut cell = self.profile.write().unwrap_or_else(PoisonError::into_inner);
        cell.owner = Some(uid.to_string());
        cell.user = user;
    }
}

impl SessionScoped for UserRepository {
    fn teardown(&self) {
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = ProfileCell::default();
        self.friendships.teardown();
    }
}

fn users_path() -> RepoResult<CollectionPath> {
    Ok(CollectionPath::root(USERS_COLLECTION)?)
}

#[cfg(test)]
mod tests {
    use super::UserRepository;
    use crate::auth::{Principal, SessionAuth};
    use crate::config::RepositoryConfig;
    use crate::model::user::FriendshipStatus;
    use crate::model::{Entity, ValidationError};
    use crate::repo::{RepoError, SessionScoped};
    use crate::store::{InMemoryDocumentStore, StoreOperation};
    use serde_json::json;
    use std::sync::Arc;

    fn repo() -> (Arc<InMemoryDocumentStore>, UserRepository) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let principal = Principal {
            uid: "u1".to_string(),
            email: Some("ada@example.com".to_string()),
            display_name: Some("Ada".to_string()),
        };
        let auth = Arc::new(SessionAuth::signed_in(principal));
        let repo = UserRepository::new(store.clone(), auth, RepositoryConfig::default());
        (store, repo)
    }

    #[test]
    fn ensure_profile_creates_once() {
        let (store, repo) = repo();
        let first = repo.ensure_profile().unwrap();
        let second = repo.ensure_profile().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.id(), Some("u1"));
        assert_eq!(first.email.as_deref(), Some("ada@example.com"));
        assert_eq!(store.call_count(StoreOperation::Set), 1);
    }

    #[test]
    fn failed_profile_update_restores_prior() {
        let (store, repo) = repo();
        repo.ensure_profile().unwrap();
        store.fail_next(StoreOperation::Update, "offline");

        assert!(repo.update_profile_field("bio", json!("hello")).is_err());
        assert_eq!(repo.profile().unwrap().bio, None);

        let updated = repo.update_profile_field("bio", json!("hello")).unwrap();
        assert_eq!(updated.bio.as_deref(), Some("hello"));
    }

    #[test]
    fn profile_update_rejects_undeclared_field() {
        let (store, repo) = repo();
        repo.ensure_profile().unwrap();

        let err = repo.update_profile_field("nickname", json!("ada")).unwrap_err();
        assert!(matches!(err, RepoError::Validation(ValidationError::UnknownField { .. })));
        assert_eq!(store.call_count(StoreOperation::Update), 0);
    }

    #[test]
    fn profile_update_requires_loaded_profile() {
        let (_store, repo) = repo();
        let err = repo.update_profile_field("bio", json!("x")).unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)));
    }

    #[test]
    fn friend_requests_reject_self_and_duplicates() {
        let (_store, repo) = repo();
        assert!(matches!(
            repo.send_friend_request("u1", None),
            Err(RepoError::Validation(_))
        ));

        let request = repo.send_friend_request("u2", Some("Grace")).unwrap();
        assert!(matches!(
            repo.send_friend_request("u2", None),
            Err(RepoError::Validation(_))
        ));

        let accepted = repo
            .accept_friend_request(request.id().unwrap())
            .unwrap();
        assert_eq!(accepted.status, FriendshipStatus::Accepted);
    }

    #[test]
    fn teardown_forgets_profile() {
        let (_store, repo) = repo();
        repo.ensure_profile().unwrap();
        repo.teardown();
        assert!(repo.profile().is_none());
    }
}
