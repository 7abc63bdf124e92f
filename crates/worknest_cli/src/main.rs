//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `worknest_core` linkage and run one board flow end to end
//!   against the in-memory store.
//! - Keep output deterministic for quick local sanity checks.

use std::process::ExitCode;
use std::sync::Arc;
use worknest_core::{
    Entity, InMemoryDocumentStore, Principal, RepositoryConfig, SessionAuth, StoreOperation,
    WorkspaceSession,
};

fn main() -> ExitCode {
    println!("worknest_core ping={}", worknest_core::ping());
    println!("worknest_core version={}", worknest_core::core_version());

    match smoke_board_flow() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("smoke failed: {message}");
            ExitCode::FAILURE
        }
    }
}

fn smoke_board_flow() -> Result<(), String> {
    let store = Arc::new(InMemoryDocumentStore::new());
    let auth = Arc::new(SessionAuth::signed_in(Principal::new("smoke-user")));
    let session = WorkspaceSession::start(store.clone(), auth.clone(), RepositoryConfig::default())
        .map_err(|err| err.to_string())?;
    let boards = session.boards();

    let board = boards
        .create_board("Smoke board", Some("#2E86AB"))
        .map_err(|err| err.to_string())?;
    let board_id = board.id().unwrap_or_default().to_string();
    println!("board created loading={}", board.is_loading());

    boards
        .rename_board(&board_id, "Smoke board (renamed)")
        .map_err(|err| err.to_string())?;

    store.fail_next(StoreOperation::Create, "simulated outage");
    let rejected = boards.create_board("Never stored", None).is_err();
    println!("failed create rolled back={} boards={}", rejected, boards.boards().len());

    let deleted = boards.delete_all_boards().map_err(|err| err.to_string())?;
    println!("bulk delete removed={deleted}");

    auth.sign_out();
    println!("session active after sign-out={}", session.is_active());
    Ok(())
}
