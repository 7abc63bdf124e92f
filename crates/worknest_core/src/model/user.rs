//! User profile and friendship records.

use super::{impl_entity_identity, now_epoch_ms, require_text, Entity, ValidationError};
use serde::{Deserialize, Serialize};

/// Profile document stored at `users/{uid}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(skip)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip)]
    pub is_loading: bool,
}

impl Entity for User {
    const KIND: &'static str = "user";
    const FIELDS: &'static [&'static str] = &[
        "email",
        "display_name",
        "avatar_url",
        "bio",
        "created_at",
    ];

    impl_entity_identity!();

    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(email) = self.email.as_deref() {
            if !email.contains('@') {
                return Err(ValidationError::InvalidField {
                    entity: "user",
                    field: "email",
                    reason: "missing `@`".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Friendship lifecycle as seen by the owning user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendshipStatus {
    #[default]
    Pending,
    Accepted,
    Blocked,
}

/// Contact entry under `users/{uid}/friendships`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Friendship {
    #[serde(skip)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend_name: Option<String>,
    #[serde(deserialize_with = "crate::model::null_as_default")]
    pub status: FriendshipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip)]
    pub is_loading: bool,
}

impl Friendship {
    pub fn request(friend_uid: impl Into<String>, friend_name: Option<String>) -> Self {
        Self {
            friend_uid: Some(friend_uid.into()),
            friend_name,
            status: FriendshipStatus::Pending,
            created_at: Some(now_epoch_ms()),
            ..Self::default()
        }
    }
}

impl Entity for Friendship {
    const KIND: &'static str = "friendship";
    const FIELDS: &'static [&'static str] = &["friend_uid", "friend_name", "status", "created_at"];

    impl_entity_identity!();

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("friendship", "friend_uid", self.friend_uid.as_deref())
    }
}
