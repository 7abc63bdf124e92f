//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose session, board and note use-cases to Dart via FRB.
//! - Own the process-wide auth provider, document store and session.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Failures surface as `ok=false` envelopes carrying a user-facing message;
//!   details go to the log only.
//! - No FFI state lock is held while repositories run.

use log::{error, info, warn};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use worknest_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    Board, DocumentStore, Entity, Principal, RepoError, RepositoryConfig, SessionAuth,
    SqliteDocumentStore, WorkspaceSession,
};

const DB_FILE_NAME: &str = "worknest.sqlite3";
const DB_PATH_ENV: &str = "WORKNEST_DB_PATH";

static DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static FFI_STATE: OnceLock<Mutex<FfiState>> = OnceLock::new();

struct FfiState {
    auth: Arc<SessionAuth>,
    store: Option<Arc<SqliteDocumentStore>>,
    config: RepositoryConfig,
    session: Option<Arc<WorkspaceSession>>,
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Id of the created or affected record, when there is one.
    pub id: Option<String>,
    /// Human-readable response message for UI notifications.
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>, id: Option<String>) -> Self {
        Self {
            ok: true,
            id,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            message: message.into(),
        }
    }
}

/// Board row for list rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardItem {
    pub id: String,
    pub name: String,
    pub background_color: Option<String>,
    pub is_favorite: bool,
    /// True while the create is still in flight.
    pub is_loading: bool,
}

/// Board list envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardListResponse {
    pub ok: bool,
    pub items: Vec<BoardItem>,
    pub message: String,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Idempotent for the same `level + log_dir`; other combinations fail.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Sets repository behavior from JSON, e.g. `{"delete_failure":"rollback"}`.
///
/// Applies to sessions started afterwards. Returns empty string on success.
#[flutter_rust_bridge::frb(sync)]
pub fn configure(config_json: String) -> String {
    match RepositoryConfig::from_json(&config_json) {
        Ok(config) => {
            state().config = config;
            String::new()
        }
        Err(err) => err.to_string(),
    }
}

/// Signs `uid` in and starts its workspace session.
///
/// The profile document is created on first sign-in.
#[flutter_rust_bridge::frb(sync)]
pub fn sign_in(uid: String, email: Option<String>, display_name: Option<String>) -> ActionResponse {
    let uid = uid.trim().to_string();
    if uid.is_empty() {
        return ActionResponse::failure(RepoError::NotAuthenticated.user_message());
    }

    let (auth, store, config, previous) = {
        let mut state = state();
        let store = match open_store(&mut state) {
            Ok(store) => store,
            Err(message) => return ActionResponse::failure(message),
        };
        (
            Arc::clone(&state.auth),
            store,
            state.config,
            state.session.take(),
        )
    };
    if let Some(previous) = previous {
        previous.end();
    }

    auth.sign_in(Principal {
        uid: uid.clone(),
        email,
        display_name,
    });
    let session = match WorkspaceSession::start(store, auth, config) {
        Ok(session) => Arc::new(session),
        Err(err) => {
            error!("event=ffi_sign_in module=ffi status=error error={err}");
            return ActionResponse::failure(RepoError::NotAuthenticated.user_message());
        }
    };
    if let Err(err) = session.users().ensure_profile() {
        warn!(
            "event=ffi_sign_in module=ffi status=profile_unavailable code={}",
            err.code()
        );
    }
    state().session = Some(session);
    info!("event=ffi_sign_in module=ffi status=ok");
    ActionResponse::success("Signed in.", Some(uid))
}

/// Signs out and tears the session down.
#[flutter_rust_bridge::frb(sync)]
pub fn sign_out() -> ActionResponse {
    let (auth, session) = {
        let mut state = state();
        (Arc::clone(&state.auth), state.session.take())
    };
    auth.sign_out();
    if let Some(session) = session {
        session.end();
    }
    ActionResponse::success("Signed out.", None)
}

#[flutter_rust_bridge::frb(sync)]
pub fn board_create(name: String, background_color: Option<String>) -> ActionResponse {
    with_session("board_create", |session| {
        session
            .boards()
            .create_board(&name, background_color.as_deref())
            .map(|board| ("Board created.".to_string(), entity_id(&board)))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn board_rename(board_id: String, name: String) -> ActionResponse {
    with_session("board_rename", |session| {
        session
            .boards()
            .rename_board(&board_id, &name)
            .map(|board| ("Board renamed.".to_string(), entity_id(&board)))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn board_toggle_favorite(board_id: String) -> ActionResponse {
    with_session("board_toggle_favorite", |session| {
        session.boards().toggle_favorite(&board_id).map(|board| {
            let message = if board.is_favorite {
                "Added to favorites."
            } else {
                "Removed from favorites."
            };
            (message.to_string(), entity_id(&board))
        })
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn board_delete(board_id: String) -> ActionResponse {
    with_session("board_delete", |session| {
        session
            .boards()
            .delete_board(&board_id)
            .map(|()| ("Board deleted.".to_string(), Some(board_id.clone())))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn board_delete_all() -> ActionResponse {
    with_session("board_delete_all", |session| {
        session
            .boards()
            .delete_all_boards()
            .map(|count| (format!("Deleted {count} board(s)."), None))
    })
}

/// Fetches boards when the cache is empty, then lists the cache.
#[flutter_rust_bridge::frb(sync)]
pub fn board_list() -> BoardListResponse {
    let Some(session) = active_session() else {
        return BoardListResponse {
            ok: false,
            items: Vec::new(),
            message: RepoError::NotAuthenticated.user_message(),
        };
    };
    let boards = session.boards();
    if let Err(err) = boards.refresh_if_empty() {
        log_failure("board_list", &err);
        return BoardListResponse {
            ok: false,
            items: Vec::new(),
            message: err.user_message(),
        };
    }
    let items = boards.boards().iter().map(to_board_item).collect::<Vec<_>>();
    let message = if items.is_empty() {
        "No boards yet.".to_string()
    } else {
        format!("{} board(s).", items.len())
    };
    BoardListResponse {
        ok: true,
        items,
        message,
    }
}

/// Returns and clears the last board failure message; empty when none.
#[flutter_rust_bridge::frb(sync)]
pub fn board_take_last_error() -> String {
    active_session()
        .and_then(|session| session.boards().collection().take_last_error())
        .unwrap_or_default()
}

#[flutter_rust_bridge::frb(sync)]
pub fn list_create(board_id: String, title: String) -> ActionResponse {
    with_session("list_create", |session| {
        session
            .notes()
            .create_list(&board_id, &title)
            .map(|list| ("List created.".to_string(), entity_id(&list)))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn note_create(board_id: String, list_id: String, title: String) -> ActionResponse {
    with_session("note_create", |session| {
        session
            .notes()
            .create_note(&board_id, &list_id, &title)
            .map(|note| ("Note created.".to_string(), entity_id(&note)))
    })
}

/// Sets a note field from its JSON-encoded value, e.g. `"\"draft\""`.
#[flutter_rust_bridge::frb(sync)]
pub fn note_update_field(
    board_id: String,
    list_id: String,
    note_id: String,
    field: String,
    value_json: String,
) -> ActionResponse {
    let value = match serde_json::from_str::<Value>(&value_json) {
        Ok(value) => value,
        Err(err) => {
            warn!("event=ffi_note_update_field module=ffi status=invalid_input error={err}");
            return ActionResponse::failure(
                RepoError::InvalidData(err.to_string()).user_message(),
            );
        }
    };
    with_session("note_update_field", |session| {
        session
            .notes()
            .update_note_field(&board_id, &list_id, &note_id, &field, value)
            .map(|note| ("Note updated.".to_string(), entity_id(&note)))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn note_set_completed(
    board_id: String,
    list_id: String,
    note_id: String,
    completed: bool,
) -> ActionResponse {
    with_session("note_set_completed", |session| {
        session
            .notes()
            .set_note_completed(&board_id, &list_id, &note_id, completed)
            .map(|note| ("Note updated.".to_string(), entity_id(&note)))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn checklist_add(
    board_id: String,
    list_id: String,
    note_id: String,
    text: String,
) -> ActionResponse {
    with_session("checklist_add", |session| {
        session
            .notes()
            .add_checklist_item(&board_id, &list_id, &note_id, &text)
            .map(|item| ("Checklist item added.".to_string(), entity_id(&item)))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn friend_request(friend_uid: String, friend_name: Option<String>) -> ActionResponse {
    with_session("friend_request", |session| {
        session
            .users()
            .send_friend_request(&friend_uid, friend_name.as_deref())
            .map(|friendship| ("Friend request sent.".to_string(), entity_id(&friendship)))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn message_send(conversation_id: String, text: String) -> ActionResponse {
    with_session("message_send", |session| {
        session
            .messages()
            .send_message(&conversation_id, &text)
            .map(|message| ("Message sent.".to_string(), entity_id(&message)))
    })
}

fn state() -> MutexGuard<'static, FfiState> {
    FFI_STATE
        .get_or_init(|| {
            Mutex::new(FfiState {
                auth: Arc::new(SessionAuth::new()),
                store: None,
                config: RepositoryConfig::default(),
                session: None,
            })
        })
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn open_store(state: &mut FfiState) -> Result<Arc<dyn DocumentStore>, String> {
    if let Some(store) = &state.store {
        return Ok(Arc::clone(store) as Arc<dyn DocumentStore>);
    }
    let path = resolve_db_path();
    match SqliteDocumentStore::open(&path) {
        Ok(store) => {
            let store = Arc::new(store);
            state.store = Some(Arc::clone(&store));
            Ok(store)
        }
        Err(err) => {
            error!("event=ffi_store_open module=ffi status=error error={err}");
            Err(RepoError::Remote(err).user_message())
        }
    }
}

fn resolve_db_path() -> PathBuf {
    DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(DB_FILE_NAME)
        })
        .clone()
}

fn active_session() -> Option<Arc<WorkspaceSession>> {
    state()
        .session
        .as_ref()
        .filter(|session| session.is_active())
        .cloned()
}

fn with_session(
    operation: &str,
    f: impl FnOnce(&WorkspaceSession) -> Result<(String, Option<String>), RepoError>,
) -> ActionResponse {
    let Some(session) = active_session() else {
        return ActionResponse::failure(RepoError::NotAuthenticated.user_message());
    };
    match f(&session) {
        Ok((message, id)) => ActionResponse::success(message, id),
        Err(err) => {
            log_failure(operation, &err);
            ActionResponse::failure(err.user_message())
        }
    }
}

fn log_failure(operation: &str, err: &RepoError) {
    error!(
        "event=ffi_{operation} module=ffi status=error code={} error={err}",
        err.code()
    );
}

fn entity_id<T: Entity>(item: &T) -> Option<String> {
    item.id().map(str::to_string)
}

fn to_board_item(board: &Board) -> BoardItem {
    BoardItem {
        id: board.id.clone().unwrap_or_default(),
        name: board.name.clone().unwrap_or_default(),
        background_color: board.background_color.clone(),
        is_favorite: board.is_favorite,
        is_loading: board.is_loading,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        board_create, board_delete, board_list, board_toggle_favorite, configure, core_version,
        init_logging, list_create, note_create, note_set_completed, note_update_field, ping,
        sign_in, sign_out,
    };
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use std::time::{SystemTime, UNIX_EPOCH};

    // FFI state is process-wide; tests touching the session run one at a time.
    static SESSION_TESTS: Mutex<()> = Mutex::new(());

    fn serial() -> MutexGuard<'static, ()> {
        SESSION_TESTS.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unique_uid(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        format!("{prefix}-{nanos}")
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "/tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn configure_rejects_malformed_json() {
        assert!(!configure("{ nope".to_string()).is_empty());
        assert!(configure(String::new()).is_empty());
    }

    #[test]
    fn board_calls_require_sign_in() {
        let _guard = serial();
        sign_out();
        let response = board_create("Orphan".to_string(), None);
        assert!(!response.ok);
        assert_eq!(response.message, "Please sign in again.");
    }

    #[test]
    fn board_flow_round_trips_through_sqlite() {
        let _guard = serial();
        let signed_in = sign_in(unique_uid("ffi-board"), None, Some("Tester".to_string()));
        assert!(signed_in.ok, "{}", signed_in.message);

        let created = board_create("Launch".to_string(), Some("#336699".to_string()));
        assert!(created.ok, "{}", created.message);
        let board_id = created.id.clone().expect("board id");

        let favorite = board_toggle_favorite(board_id.clone());
        assert!(favorite.ok, "{}", favorite.message);

        let listed = board_list();
        assert!(listed.ok);
        assert!(listed
            .items
            .iter()
            .any(|item| item.id == board_id && item.is_favorite && !item.is_loading));

        assert!(board_delete(board_id.clone()).ok);
        assert!(board_list().items.iter().all(|item| item.id != board_id));
        assert!(sign_out().ok);
    }

    #[test]
    fn invalid_board_color_is_reported() {
        let _guard = serial();
        assert!(sign_in(unique_uid("ffi-color"), None, None).ok);
        let response = board_create("Colors".to_string(), Some("teal".to_string()));
        assert!(!response.ok);
        assert!(response.message.starts_with("Please check your input"));
        sign_out();
    }

    #[test]
    fn note_flow_uses_nested_collections() {
        let _guard = serial();
        assert!(sign_in(unique_uid("ffi-notes"), None, None).ok);
        let board_id = board_create("Work".to_string(), None).id.expect("board id");
        let list_id = list_create(board_id.clone(), "Todo".to_string())
            .id
            .expect("list id");
        let note = note_create(board_id.clone(), list_id.clone(), "Draft".to_string());
        let note_id = note.id.expect("note id");

        assert!(note_set_completed(board_id.clone(), list_id.clone(), note_id.clone(), true).ok);
        let updated = note_update_field(
            board_id.clone(),
            list_id.clone(),
            note_id.clone(),
            "description".to_string(),
            "\"ship friday\"".to_string(),
        );
        assert!(updated.ok, "{}", updated.message);

        let malformed = note_update_field(
            board_id.clone(),
            list_id.clone(),
            note_id.clone(),
            "description".to_string(),
            "{".to_string(),
        );
        assert!(!malformed.ok);

        let undeclared = note_update_field(
            board_id,
            list_id,
            note_id,
            "owner".to_string(),
            "\"mallory\"".to_string(),
        );
        assert!(!undeclared.ok);
        assert!(undeclared.message.starts_with("Please check your input"));
        sign_out();
    }
}
