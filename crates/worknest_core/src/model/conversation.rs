//! Conversation and message records.

use super::{impl_entity_identity, now_epoch_ms, require_text, Entity, ValidationError};
use serde::{Deserialize, Serialize};

/// Conversation header under `users/{uid}/conversations`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conversation {
    #[serde(skip)]
    pub id: Option<String>,
    #[serde(deserialize_with = "crate::model::null_as_default")]
    pub participant_uids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(skip)]
    pub is_loading: bool,
}

impl Conversation {
    pub fn new(participant_uids: Vec<String>, title: Option<String>) -> Self {
        Self {
            participant_uids,
            title,
            updated_at: Some(now_epoch_ms()),
            ..Self::default()
        }
    }
}

impl Entity for Conversation {
    const KIND: &'static str = "conversation";
    const FIELDS: &'static [&'static str] = &[
        "participant_uids",
        "title",
        "last_message",
        "updated_at",
    ];

    impl_entity_identity!();

    fn validate(&self) -> Result<(), ValidationError> {
        if self.participant_uids.is_empty() {
            return Err(ValidationError::BlankField {
                entity: "conversation",
                field: "participant_uids",
            });
        }
        Ok(())
    }
}

/// Single chat message inside a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    #[serde(skip)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<i64>,
    #[serde(deserialize_with = "crate::model::null_as_default")]
    pub is_read: bool,
    #[serde(skip)]
    pub is_loading: bool,
}

impl Message {
    pub fn outgoing(sender_uid: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_uid: Some(sender_uid.into()),
            text: Some(text.into()),
            sent_at: Some(now_epoch_ms()),
            is_read: false,
            ..Self::default()
        }
    }
}

impl Entity for Message {
    const KIND: &'static str = "message";
    const FIELDS: &'static [&'static str] = &["sender_uid", "text", "sent_at", "is_read"];

    impl_entity_identity!();

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("message", "text", self.text.as_deref())
    }
}
