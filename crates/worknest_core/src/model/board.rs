//! Board, note-list, note and checklist records.
//!
//! # Invariants
//! - Board name, list title, note title and checklist text are non-blank.
//! - `background_color` is `#RRGGBB` when set.

use super::{impl_entity_identity, now_epoch_ms, require_text, Entity, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid hex color regex"));

/// Top-level board owned by one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Board {
    #[serde(skip)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(deserialize_with = "crate::model::null_as_default")]
    pub is_favorite: bool,
    #[serde(deserialize_with = "crate::model::null_as_default")]
    pub member_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(skip)]
    pub is_loading: bool,
}

impl Board {
    pub fn new(name: impl Into<String>) -> Self {
        let now = now_epoch_ms();
        Self {
            name: Some(name.into()),
            created_at: Some(now),
            updated_at: Some(now),
            ..Self::default()
        }
    }
}

impl Entity for Board {
    const KIND: &'static str = "board";
    const FIELDS: &'static [&'static str] = &[
        "name",
        "description",
        "background_color",
        "is_favorite",
        "member_ids",
        "created_at",
        "updated_at",
    ];

    impl_entity_identity!();

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("board", "name", self.name.as_deref())?;
        if let Some(color) = self.background_color.as_deref() {
            if !HEX_COLOR_RE.is_match(color) {
                return Err(ValidationError::InvalidField {
                    entity: "board",
                    field: "background_color",
                    reason: format!("expected #RRGGBB, got `{color}`"),
                });
            }
        }
        Ok(())
    }
}

/// Column of notes inside a board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteList {
    #[serde(skip)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip)]
    pub is_loading: bool,
}

impl NoteList {
    pub fn new(title: impl Into<String>, position: u32) -> Self {
        Self {
            title: Some(title.into()),
            position: Some(position),
            created_at: Some(now_epoch_ms()),
            ..Self::default()
        }
    }
}

impl Entity for NoteList {
    const KIND: &'static str = "note_list";
    const FIELDS: &'static [&'static str] = &["title", "position", "created_at"];

    impl_entity_identity!();

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("note_list", "title", self.title.as_deref())
    }
}

/// Task card inside a note list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Note {
    #[serde(skip)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unix epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<i64>,
    #[serde(deserialize_with = "crate::model::null_as_default")]
    pub is_completed: bool,
    #[serde(deserialize_with = "crate::model::null_as_default")]
    pub label_colors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip)]
    pub is_loading: bool,
}

impl Note {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            created_at: Some(now_epoch_ms()),
            ..Self::default()
        }
    }
}

impl Entity for Note {
    const KIND: &'static str = "note";
    const FIELDS: &'static [&'static str] = &[
        "title",
        "description",
        "due_date",
        "is_completed",
        "label_colors",
        "created_at",
    ];

    impl_entity_identity!();

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("note", "title", self.title.as_deref())?;
        if let Some(color) = self
            .label_colors
            .iter()
            .find(|color| !HEX_COLOR_RE.is_match(color))
        {
            return Err(ValidationError::InvalidField {
                entity: "note",
                field: "label_colors",
                reason: format!("expected #RRGGBB, got `{color}`"),
            });
        }
        Ok(())
    }
}

/// One checklist item attached to a note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checklist {
    #[serde(skip)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(deserialize_with = "crate::model::null_as_default")]
    pub is_checked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip)]
    pub is_loading: bool,
}

impl Checklist {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            created_at: Some(now_epoch_ms()),
            ..Self::default()
        }
    }
}

impl Entity for Checklist {
    const KIND: &'static str = "checklist";
    const FIELDS: &'static [&'static str] = &["text", "is_checked", "created_at"];

    impl_entity_identity!();

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("checklist", "text", self.text.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::{Board, Note};
    use crate::model::{Entity, ValidationError};

    #[test]
    fn board_requires_name() {
        let board = Board::new("   ");
        assert_eq!(
            board.validate(),
            Err(ValidationError::BlankField {
                entity: "board",
                field: "name"
            })
        );
    }

    #[test]
    fn board_rejects_malformed_color() {
        let mut board = Board::new("Sprint");
        board.background_color = Some("blue".to_string());
        assert!(matches!(
            board.validate(),
            Err(ValidationError::InvalidField {
                field: "background_color",
                ..
            })
        ));

        board.background_color = Some("#1A2b3C".to_string());
        assert!(board.validate().is_ok());
    }

    #[test]
    fn note_label_colors_must_be_hex() {
        let mut note = Note::new("Ship it");
        note.label_colors = vec!["#ff0000".to_string(), "red".to_string()];
        assert!(note.validate().is_err());
    }
}
