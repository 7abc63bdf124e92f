//! Note list, note and checklist repository.
//!
//! # Responsibility
//! - Address the nested collections of one board:
//!   `boards/{board}/lists`, `.../lists/{list}/notes` and
//!   `.../notes/{note}/checklists`.
//! - Lazily create one optimistic cache per nested collection.
//!
//! # Invariants
//! - One cache per relative path; repeated calls share it.
//! - Deleting a board, list or note tears down the caches nested below it.
//!   The remote child documents are left in place.
//! - Read accessors never create a cache.

use crate::auth::AuthProvider;
use crate::config::RepositoryConfig;
use crate::model::board::{Checklist, Note, NoteList};
use crate::model::Entity;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::optimistic::OptimisticCollection;
use crate::repo::{relative_path, SessionScoped};
use crate::store::DocumentStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

type CacheMap<T> = Mutex<HashMap<Vec<String>, OptimisticCollection<T>>>;

/// Lists, notes and checklists below the principal's boards.
pub struct NoteRepository {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    config: RepositoryConfig,
    lists: CacheMap<NoteList>,
    notes: CacheMap<Note>,
    checklists: CacheMap<Checklist>,
}

impl NoteRepository {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            store,
            auth,
            config,
            lists: Mutex::new(HashMap::new()),
            notes: Mutex::new(HashMap::new()),
            checklists: Mutex::new(HashMap::new()),
        }
    }

    /// Cache of the lists of `board_id`.
    pub fn list_collection(&self, board_id: &str) -> OptimisticCollection<NoteList> {
        self.cached(&self.lists, lists_path(board_id))
    }

    /// Cache of the notes of one list.
    pub fn note_collection(&self, board_id: &str, list_id: &str) -> OptimisticCollection<Note> {
        self.cached(&self.notes, notes_path(board_id, list_id))
    }

    /// Cache of the checklist of one note.
    pub fn checklist_collection(
        &self,
        board_id: &str,
        list_id: &str,
        note_id: &str,
    ) -> OptimisticCollection<Checklist> {
        self.cached(&self.checklists, checklist_path(board_id, list_id, note_id))
    }

    /// Appends a list; its position is the current list count.
    pub fn create_list(&self, board_id: &str, title: &str) -> RepoResult<NoteList> {
        let lists = self.list_collection(board_id);
        let position = u32::try_from(lists.len()).unwrap_or(u32::MAX);
        lists.create(NoteList::new(title.trim(), position))
    }

    pub fn rename_list(&self, board_id: &str, list_id: &str, title: &str) -> RepoResult<NoteList> {
        self.list_collection(board_id)
            .update_field(list_id, "title", json!(title.trim()))
    }

    pub fn delete_list(&self, board_id: &str, list_id: &str) -> RepoResult<()> {
        self.list_collection(board_id).delete(list_id)?;
        let prefix = notes_path(board_id, list_id);
        self.evict(&self.notes, &prefix);
        self.evict(&self.checklists, &prefix);
        Ok(())
    }

    pub fn create_note(&self, board_id: &str, list_id: &str, title: &str) -> RepoResult<Note> {
        self.note_collection(board_id, list_id)
            .create(Note::new(title.trim()))
    }

    /// Sets one note field, e.g. `description`, `due_date` or `label_colors`.
    pub fn update_note_field(
        &self,
        board_id: &str,
        list_id: &str,
        note_id: &str,
        field: &str,
        value: Value,
    ) -> RepoResult<Note> {
        self.note_collection(board_id, list_id)
            .update_field(note_id, field, value)
    }

    pub fn set_note_completed(
        &self,
        board_id: &str,
        list_id: &str,
        note_id: &str,
        completed: bool,
    ) -> RepoResult<Note> {
        self.update_note_field(board_id, list_id, note_id, "is_completed", json!(completed))
    }

    pub fn delete_note(&self, board_id: &str, list_id: &str, note_id: &str) -> RepoResult<()> {
        self.note_collection(board_id, list_id).delete(note_id)?;
        self.evict(&self.checklists, &checklist_path(board_id, list_id, note_id));
        Ok(())
    }

    /// Tears down every list, note and checklist cache of `board_id`.
    pub fn evict_board(&self, board_id: &str) {
        let prefix = relative_path(&["boards", board_id]);
        self.evict(&self.checklists, &prefix);
        self.evict(&self.notes, &prefix);
        self.evict(&self.lists, &prefix);
    }

    pub fn add_checklist_item(
        &self,
        board_id: &str,
        list_id: &str,
        note_id: &str,
        text: &str,
    ) -> RepoResult<Checklist> {
        self.checklist_collection(board_id, list_id, note_id)
            .create(Checklist::new(text.trim()))
    }

    pub fn toggle_checklist_item(
        &self,
        board_id: &str,
        list_id: &str,
        note_id: &str,
        item_id: &str,
    ) -> RepoResult<Checklist> {
        let checklist = self.checklist_collection(board_id, list_id, note_id);
        let current = checklist
            .get(item_id)
            .ok_or_else(|| RepoError::NotFound(item_id.to_string()))?;
        checklist.update_field(item_id, "is_checked", json!(!current.is_checked))
    }

    pub fn delete_checklist_item(
        &self,
        board_id: &str,
        list_id: &str,
        note_id: &str,
        item_id: &str,
    ) -> RepoResult<()> {
        self.checklist_collection(board_id, list_id, note_id)
            .delete(item_id)
    }

    /// Removes every checklist item of a note in one batch.
    pub fn clear_checklist(&self, board_id: &str, list_id: &str, note_id: &str) -> RepoResult<usize> {
        self.checklist_collection(board_id, list_id, note_id)
            .bulk_delete()
    }

    pub fn subscribe_lists(&self, board_id: &str) -> RepoResult<()> {
        self.list_collection(board_id).subscribe()
    }

    pub fn subscribe_notes(&self, board_id: &str, list_id: &str) -> RepoResult<()> {
        self.note_collection(board_id, list_id).subscribe()
    }

    pub fn subscribe_checklist(&self, board_id: &str, list_id: &str, note_id: &str) -> RepoResult<()> {
        self.checklist_collection(board_id, list_id, note_id)
            .subscribe()
    }

    pub fn refresh_lists_if_empty(&self, board_id: &str) -> RepoResult<bool> {
        self.list_collection(board_id).refresh_if_empty()
    }

    pub fn refresh_notes_if_empty(&self, board_id: &str, list_id: &str) -> RepoResult<bool> {
        self.note_collection(board_id, list_id).refresh_if_empty()
    }

    pub fn lists(&self, board_id: &str) -> Vec<NoteList> {
        cached_items(&self.lists, &lists_path(board_id))
    }

    pub fn notes(&self, board_id: &str, list_id: &str) -> Vec<Note> {
        cached_items(&self.notes, &notes_path(board_id, list_id))
    }

    pub fn checklist(&self, board_id: &str, list_id: &str, note_id: &str) -> Vec<Checklist> {
        cached_items(&self.checklists, &checklist_path(board_id, list_id, note_id))
    }

    fn cached<T: Entity>(&self, map: &CacheMap<T>, relative: Vec<String>) -> OptimisticCollection<T> {
        let mut caches = map.lock().unwrap_or_else(PoisonError::into_inner);
        caches
            .entry(relative.clone())
            .or_insert_with(|| {
                OptimisticCollection::new(
                    Arc::clone(&self.store),
                    Arc::clone(&self.auth),
                    relative,
                    self.config,
                )
            })
            .clone()
    }

    /// Tears down and forgets every cache whose path starts with `prefix`.
    fn evict<T: Entity>(&self, map: &CacheMap<T>, prefix: &[String]) {
        let evicted = {
            let mut caches = map.lock().unwrap_or_else(PoisonError::into_inner);
            let keys = caches
                .keys()
                .filter(|path| path.starts_with(prefix))
                .cloned()
                .collect::<Vec<_>>();
            keys.into_iter()
                .filter_map(|key| caches.remove(&key))
                .collect::<Vec<_>>()
        };
        for collection in evicted {
            collection.teardown();
        }
    }
}

impl SessionScoped for NoteRepository {
    fn teardown(&self) {
        self.evict(&self.checklists, &[]);
        self.evict(&self.notes, &[]);
        self.evict(&self.lists, &[]);
    }
}

/// Items of an existing cache; empty when none was created yet.
fn cached_items<T: Entity>(map: &CacheMap<T>, relative: &[String]) -> Vec<T> {
    map.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(relative)
        .map(OptimisticCollection::items)
        .unwrap_or_default()
}

fn lists_path(board_id: &str) -> Vec<String> {
    relative_path(&["boards", board_id, "lists"])
}

fn notes_path(board_id: &str, list_id: &str) -> Vec<String> {
    relative_path(&["boards", board_id, "lists", list_id, "notes"])
}

fn checklist_path(board_id: &str, list_id: &str, note_id: &str) -> Vec<String> {
    relative_path(&[
        "boards",
        board_id,
        "lists",
        list_id,
        "notes",
        note_id,
        "checklists",
    ])
}
