//! Board repository.
//!
//! # Responsibility
//! - Manage the principal's boards at `users/{uid}/boards`.
//!
//! # Invariants
//! - Renames and favorite toggles refresh `updated_at`.
//! - Deleting a board tears down the attached note caches below it.

use crate::auth::AuthProvider;
use crate::config::RepositoryConfig;
use crate::model::board::Board;
use crate::model::{now_epoch_ms, DocumentData, Entity};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::note_repo::NoteRepository;
use crate::repo::optimistic::OptimisticCollection;
use crate::repo::{relative_path, SessionScoped};
use crate::store::DocumentStore;
use serde_json::{json, Value};
use std::sync::Arc;

const BOARDS: &str = "boards";

/// Boards of the signed-in principal.
pub struct BoardRepository {
    boards: OptimisticCollection<Board>,
    notes: Option<Arc<NoteRepository>>,
}

impl BoardRepository {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            boards: OptimisticCollection::new(store, auth, relative_path(&[BOARDS]), config),
            notes: None,
        }
    }

    /// Attaches the note repository whose board caches follow board deletes.
    pub fn with_notes(mut self, notes: Arc<NoteRepository>) -> Self {
        self.notes = Some(notes);
        self
    }

    /// Creates a board; `background_color` must be `#RRGGBB` when given.
    pub fn create_board(&self, name: &str, background_color: Option<&str>) -> RepoResult<Board> {
        let mut board = Board::new(name.trim());
        board.background_color = background_color.map(str::to_string);
        self.boards.create(board)
    }

    pub fn rename_board(&self, id: &str, name: &str) -> RepoResult<Board> {
        self.boards
            .update_fields(id, touched(&[("name", json!(name.trim()))]))
    }

    /// Sets or clears (`None`) the board description.
    pub fn describe_board(&self, id: &str, description: Option<&str>) -> RepoResult<Board> {
        let value = description.map_or(Value::Null, |text| json!(text));
        self.boards
            .update_fields(id, touched(&[("description", value)]))
    }

    pub fn toggle_favorite(&self, id: &str) -> RepoResult<Board> {
        let current = self
            .boards
            .get(id)
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;
        self.boards.update_fields(
            id,
            touched(&[("is_favorite", json!(!current.is_favorite))]),
        )
    }

    pub fn delete_board(&self, id: &str) -> RepoResult<()> {
        self.boards.delete(id)?;
        if let Some(notes) = &self.notes {
            notes.evict_board(id);
        }
        Ok(())
    }

    /// Deletes every confirmed board in one batch; returns how many.
    pub fn delete_all_boards(&self) -> RepoResult<usize> {
        let before = self.boards.items();
        let deleted = self.boards.bulk_delete()?;
        if let Some(notes) = &self.notes {
            before
                .iter()
                .filter_map(|board| board.id())
                .filter(|id| self.boards.get(id).is_none())
                .for_each(|id| notes.evict_board(id));
        }
        Ok(deleted)
    }

    pub fn subscribe(&self) -> RepoResult<()> {
        self.boards.subscribe()
    }

    pub fn unsubscribe(&self) {
        self.boards.unsubscribe();
    }

    pub fn refresh(&self) -> RepoResult<usize> {
        self.boards.refresh()
    }

    pub fn refresh_if_empty(&self) -> RepoResult<bool> {
        self.boards.refresh_if_empty()
    }

    pub fn boards(&self) -> Vec<Board> {
        self.boards.items()
    }

    pub fn board(&self, id: &str) -> Option<Board> {
        self.boards.get(id)
    }

    /// Underlying cache, for observers and status.
    pub fn collection(&self) -> &OptimisticCollection<Board> {
        &self.boards
    }
}

impl SessionScoped for BoardRepository {
    fn teardown(&self) {
        self.boards.teardown();
    }
}

fn touched(fields: &[(&str, Value)]) -> DocumentData {
    let mut patch = fields
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect::<DocumentData>();
    patch.insert("updated_at".to_string(), json!(now_epoch_ms()));
    patch
}
