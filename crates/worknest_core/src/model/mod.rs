//! Entity records mirroring remote document shapes.
//!
//! # Responsibility
//! - Define the board/note/social records cached by repositories.
//! - Provide the `Entity` contract used by the optimistic collection.
//!
//! # Invariants
//! - Document ids are never part of the serialized body.
//! - `is_loading` is transient UI state and is never persisted remotely.
//! - Unknown remote fields are ignored; missing fields decode as `None`.
//! - Flags and lists decode `null` as their default.
//! - Local patches may only name declared fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub mod board;
pub mod conversation;
pub mod user;

/// Document identifier inside one remote collection.
pub type DocumentId = String;

/// Serialized document body (field name -> JSON value).
pub type DocumentData = Map<String, Value>;

/// Record validation failure raised before any local or remote mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    BlankField {
        entity: &'static str,
        field: &'static str,
    },
    InvalidField {
        entity: &'static str,
        field: &'static str,
        reason: String,
    },
    UnknownField {
        entity: &'static str,
        field: String,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankField { entity, field } => {
                write!(f, "{entity}.{field} must not be blank")
            }
            Self::InvalidField {
                entity,
                field,
                reason,
            } => write!(f, "{entity}.{field} is invalid: {reason}"),
            Self::UnknownField { entity, field } => {
                write!(f, "{entity} has no field `{field}`")
            }
        }
    }
}

impl Error for ValidationError {}

/// Contract shared by every record stored in a remote sub-collection.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable label used in log events.
    const KIND: &'static str;
    /// Body fields a patch may set.
    const FIELDS: &'static [&'static str];

    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: DocumentId);
    fn is_loading(&self) -> bool;
    fn set_loading(&mut self, loading: bool);

    /// Checks required fields. Default accepts everything.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

macro_rules! impl_entity_identity {
    () => {
        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }

        fn set_id(&mut self, id: $crate::model::DocumentId) {
            self.id = Some(id);
        }

        fn is_loading(&self) -> bool {
            self.is_loading
        }

        fn set_loading(&mut self, loading: bool) {
            self.is_loading = loading;
        }
    };
}

pub(crate) use impl_entity_identity;

/// Generates a client-side provisional document id.
pub fn new_document_id() -> DocumentId {
    Uuid::new_v4().simple().to_string()
}

/// Current time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Serializes an entity body. The id and loading flag are not included.
pub fn encode_entity<T: Entity>(item: &T) -> Result<DocumentData, serde_json::Error> {
    match serde_json::to_value(item)? {
        Value::Object(map) => Ok(map),
        other => Err(serde::ser::Error::custom(format!(
            "{} must serialize to an object, got {other}",
            T::KIND
        ))),
    }
}

/// Decodes a document body and attaches its id.
pub fn decode_entity<T: Entity>(id: &str, data: &DocumentData) -> Result<T, serde_json::Error> {
    let mut item: T = serde_json::from_value(Value::Object(data.clone()))?;
    item.set_id(id.to_string());
    item.set_loading(false);
    Ok(item)
}

/// Applies a field patch to a copy of `item`, keeping identity and loading state.
pub fn patch_entity<T: Entity>(item: &T, fields: &DocumentData) -> Result<T, serde_json::Error> {
    let mut body = encode_entity(item)?;
    for (key, value) in fields {
        body.insert(key.clone(), value.clone());
    }
    let mut patched: T = serde_json::from_value(Value::Object(body))?;
    if let Some(id) = item.id() {
        patched.set_id(id.to_string());
    }
    patched.set_loading(item.is_loading());
    Ok(patched)
}

/// Rejects patch keys that are not body fields of `T`.
pub fn check_patch_fields<T: Entity>(fields: &DocumentData) -> Result<(), ValidationError> {
    match fields.keys().find(|key| !T::FIELDS.contains(&key.as_str())) {
        Some(key) => Err(ValidationError::UnknownField {
            entity: T::KIND,
            field: key.clone(),
        }),
        None => Ok(()),
    }
}

/// Deserializes an explicit `null` as `V::default()`.
pub(crate) fn null_as_default<'de, D, V>(deserializer: D) -> Result<V, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de> + Default,
{
    Ok(Option::<V>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn require_text(
    entity: &'static str,
    field: &'static str,
    value: Option<&str>,
) -> Result<(), ValidationError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(()),
        _ => Err(ValidationError::BlankField { entity, field }),
    }
}

#[cfg(test)]
mod tests {
    use super::board::Board;
    use super::{check_patch_fields, decode_entity, encode_entity, patch_entity, Entity};
    use super::ValidationError;
    use serde_json::json;

    #[test]
    fn encoding_skips_id_and_loading_flag() {
        let mut board = Board::new("Roadmap");
        board.set_id("b1".to_string());
        board.set_loading(true);

        let body = encode_entity(&board).unwrap();
        assert!(!body.contains_key("id"));
        assert!(!body.contains_key("is_loading"));
        assert_eq!(body.get("name"), Some(&json!("Roadmap")));
    }

    #[test]
    fn decoding_tolerates_missing_and_unknown_fields() {
        let data = json!({ "name": "Inbox", "legacy_flag": true })
            .as_object()
            .cloned()
            .unwrap();
        let board: Board = decode_entity("b9", &data).unwrap();
        assert_eq!(board.id(), Some("b9"));
        assert_eq!(board.name.as_deref(), Some("Inbox"));
        assert_eq!(board.description, None);
        assert!(!board.is_loading());
    }

    #[test]
    fn patch_keeps_identity() {
        let mut board = Board::new("Old");
        board.set_id("b2".to_string());
        let fields = json!({ "name": "New" }).as_object().cloned().unwrap();

        let patched = patch_entity(&board, &fields).unwrap();
        assert_eq!(patched.id(), Some("b2"));
        assert_eq!(patched.name.as_deref(), Some("New"));
    }

    #[test]
    fn null_flags_and_lists_decode_as_defaults() {
        let data = json!({ "name": "Half synced", "is_favorite": null, "member_ids": null })
            .as_object()
            .cloned()
            .unwrap();
        let board: Board = decode_entity("b3", &data).unwrap();
        assert!(!board.is_favorite);
        assert!(board.member_ids.is_empty());
        assert_eq!(board.name.as_deref(), Some("Half synced"));
    }

    #[test]
    fn patch_with_undeclared_field_is_rejected() {
        let fields = json!({ "name": "Ok", "nmae": "typo" }).as_object().cloned().unwrap();
        assert_eq!(
            check_patch_fields::<Board>(&fields),
            Err(ValidationError::UnknownField {
                entity: "board",
                field: "nmae".to_string()
            })
        );

        let declared = json!({ "description": null, "is_favorite": true })
            .as_object()
            .cloned()
            .unwrap();
        assert!(check_patch_fields::<Board>(&declared).is_ok());
    }
}
