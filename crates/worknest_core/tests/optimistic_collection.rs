use serde_json::json;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use worknest_core::store::{
    BatchOp, CollectionPath, Document, ListenerId, SnapshotListener, StoreResult,
};
use worknest_core::model::DocumentData;
use worknest_core::{
    Board, DeleteFailurePolicy, DocumentStore, Entity, InMemoryDocumentStore, OptimisticCollection,
    Principal, RepoError, RepositoryConfig, SessionAuth, StoreOperation,
};

fn boards_path() -> CollectionPath {
    CollectionPath::parse("users/u1/boards").unwrap()
}

fn setup(
    config: RepositoryConfig,
) -> (Arc<InMemoryDocumentStore>, Arc<SessionAuth>, OptimisticCollection<Board>) {
    let store = Arc::new(InMemoryDocumentStore::new());
    let auth = Arc::new(SessionAuth::signed_in(Principal::new("u1")));
    let collection = OptimisticCollection::new(
        store.clone(),
        auth.clone(),
        vec!["boards".to_string()],
        config,
    );
    (store, auth, collection)
}

fn seed(store: &InMemoryDocumentStore, id: &str, name: &str) {
    let data = json!({ "name": name }).as_object().cloned().unwrap();
    store.create(&boards_path(), Some(id), data).unwrap();
}

fn names(items: &[Board]) -> Vec<String> {
    items
        .iter()
        .map(|board| board.name.clone().unwrap_or_default())
        .collect()
}

#[test]
fn successful_create_leaves_one_committed_entity() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());

    let created = collection.create(Board::new("Sprint")).unwrap();

    let items = collection.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name.as_deref(), Some("Sprint"));
    assert!(!items[0].is_loading());
    assert_eq!(items[0].id(), created.id());
    assert_eq!(store.peek(&boards_path()).len(), 1);
    assert_eq!(collection.status().pending_writes, 0);
}

#[test]
fn failed_create_restores_pre_operation_state() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());
    collection.create(Board::new("Existing")).unwrap();
    let before = collection.items();
    store.fail_next(StoreOperation::Create, "network down");

    let err = collection.create(Board::new("Doomed")).unwrap_err();

    assert!(matches!(err, RepoError::Remote(_)));
    assert_eq!(err.user_message(), "Something went wrong. Please try again.");
    assert_eq!(collection.items(), before);
    assert_eq!(
        collection.take_last_error().as_deref(),
        Some("Something went wrong. Please try again.")
    );
}

#[test]
fn invalid_create_touches_nothing() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());

    let err = collection.create(Board::new("   ")).unwrap_err();

    assert!(matches!(err, RepoError::Validation(_)));
    assert!(collection.is_empty());
    assert_eq!(store.call_count(StoreOperation::Create), 0);
}

#[test]
fn successful_delete_removes_item() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());
    let board = collection.create(Board::new("Old")).unwrap();
    let id = board.id().unwrap().to_string();

    collection.delete(&id).unwrap();

    assert!(collection.get(&id).is_none());
    assert!(store.peek(&boards_path()).is_empty());
}

#[test]
fn failed_delete_keeps_local_removal_by_default() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());
    let board = collection.create(Board::new("Sticky")).unwrap();
    let id = board.id().unwrap().to_string();
    store.fail_next(StoreOperation::Delete, "permission denied");

    collection.delete(&id).unwrap();

    assert!(collection.get(&id).is_none());
    assert_eq!(store.peek(&boards_path()).len(), 1);
    assert!(collection.take_last_error().is_some());
}

#[test]
fn failed_delete_rolls_back_under_rollback_policy() {
    let config = RepositoryConfig {
        delete_failure: DeleteFailurePolicy::Rollback,
        ..RepositoryConfig::default()
    };
    let (store, _auth, collection) = setup(config);
    collection.create(Board::new("A")).unwrap();
    let middle = collection.create(Board::new("B")).unwrap();
    collection.create(Board::new("C")).unwrap();
    let before = collection.items();
    store.fail_next(StoreOperation::Delete, "permission denied");

    let err = collection.delete(middle.id().unwrap()).unwrap_err();

    assert!(matches!(err, RepoError::Remote(_)));
    assert_eq!(collection.items(), before);
}

#[test]
fn failed_bulk_delete_restores_exact_snapshot() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());
    for name in ["One", "Two", "Three"] {
        collection.create(Board::new(name)).unwrap();
    }
    let before = collection.items();
    store.fail_next(StoreOperation::Batch, "quota exceeded");

    assert!(collection.bulk_delete().is_err());

    assert_eq!(collection.items(), before);
    assert_eq!(store.peek(&boards_path()).len(), 3);
}

#[test]
fn successful_bulk_delete_clears_everything() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());
    collection.create(Board::new("One")).unwrap();
    collection.create(Board::new("Two")).unwrap();

    assert_eq!(collection.bulk_delete().unwrap(), 2);
    assert!(collection.is_empty());
    assert!(store.peek(&boards_path()).is_empty());
    assert_eq!(collection.bulk_delete().unwrap(), 0);
}

#[test]
fn refresh_if_empty_skips_populated_cache() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());
    collection.create(Board::new("Cached")).unwrap();

    assert!(!collection.refresh_if_empty().unwrap());
    assert_eq!(store.call_count(StoreOperation::List), 0);
}

#[test]
fn refresh_if_empty_fetches_once_for_empty_cache() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());
    seed(&store, "b1", "Remote one");
    seed(&store, "b2", "Remote two");

    assert!(collection.refresh_if_empty().unwrap());
    assert_eq!(store.call_count(StoreOperation::List), 1);
    assert_eq!(names(&collection.items()), vec!["Remote one", "Remote two"]);
    assert!(!collection.status().is_syncing);

    assert!(!collection.refresh_if_empty().unwrap());
    assert_eq!(store.call_count(StoreOperation::List), 1);
}

#[test]
fn live_snapshot_replaces_stale_entries() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());
    seed(&store, "b1", "Keep");
    seed(&store, "b2", "Stale");
    collection.subscribe().unwrap();
    assert_eq!(collection.len(), 2);

    store.delete(&boards_path(), "b2").unwrap();
    seed(&store, "b3", "Fresh");

    assert_eq!(names(&collection.items()), vec!["Keep", "Fresh"]);
    assert!(collection.status().is_subscribed);
}

#[test]
fn subscribing_twice_keeps_one_listener_and_teardown_detaches() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());
    collection.subscribe().unwrap();
    collection.subscribe().unwrap();
    assert_eq!(store.listener_count(), 1);

    collection.teardown();
    assert_eq!(store.listener_count(), 0);
    assert!(collection.is_empty());
    assert_eq!(collection.status().owner, None);
}

#[test]
fn failed_update_restores_prior_value() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());
    let board = collection.create(Board::new("Before")).unwrap();
    let id = board.id().unwrap().to_string();
    store.fail_next(StoreOperation::Update, "conflict");

    assert!(collection.update_field(&id, "name", json!("After")).is_err());
    assert_eq!(collection.get(&id), Some(board));

    let updated = collection.update_field(&id, "name", json!("After")).unwrap();
    assert_eq!(updated.name.as_deref(), Some("After"));
}

#[test]
fn every_operation_requires_principal() {
    let (store, auth, collection) = setup(RepositoryConfig::default());
    auth.sign_out();

    assert!(matches!(
        collection.create(Board::new("x")),
        Err(RepoError::NotAuthenticated)
    ));
    assert!(matches!(collection.delete("b1"), Err(RepoError::NotAuthenticated)));
    assert!(matches!(
        collection.update_field("b1", "name", json!("y")),
        Err(RepoError::NotAuthenticated)
    ));
    assert!(matches!(collection.bulk_delete(), Err(RepoError::NotAuthenticated)));
    assert!(matches!(collection.subscribe(), Err(RepoError::NotAuthenticated)));
    assert!(matches!(collection.refresh(), Err(RepoError::NotAuthenticated)));
    assert!(matches!(
        collection.refresh_if_empty(),
        Err(RepoError::NotAuthenticated)
    ));
    assert_eq!(store.call_count(StoreOperation::List), 0);
}

type WriteHook = Arc<dyn Fn(&CollectionPath) + Send + Sync>;

/// Delegating store that runs a hook before every single-document write
/// reaches the inner store.
struct HookedStore {
    inner: Arc<InMemoryDocumentStore>,
    before_write: Mutex<Option<WriteHook>>,
}

impl HookedStore {
    fn new(inner: Arc<InMemoryDocumentStore>) -> Self {
        Self {
            inner,
            before_write: Mutex::new(None),
        }
    }

    fn set_hook(&self, hook: WriteHook) {
        *self.before_write.lock().unwrap() = Some(hook);
    }

    fn run_hook(&self, path: &CollectionPath) {
        let hook = self.before_write.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(path);
        }
    }
}

impl DocumentStore for HookedStore {
    fn create(
        &self,
        path: &CollectionPath,
        id_hint: Option<&str>,
        data: DocumentData,
    ) -> StoreResult<Document> {
        self.run_hook(path);
        self.inner.create(path, id_hint, data)
    }

    fn get(&self, path: &CollectionPath, id: &str) -> StoreResult<Option<Document>> {
        self.inner.get(path, id)
    }

    fn list(&self, path: &CollectionPath) -> StoreResult<Vec<Document>> {
        self.inner.list(path)
    }

    fn update(&self, path: &CollectionPath, id: &str, fields: DocumentData) -> StoreResult<Document> {
        self.run_hook(path);
        self.inner.update(path, id, fields)
    }

    fn set(&self, path: &CollectionPath, id: &str, data: DocumentData) -> StoreResult<Document> {
        self.inner.set(path, id, data)
    }

    fn delete(&self, path: &CollectionPath, id: &str) -> StoreResult<()> {
        self.run_hook(path);
        self.inner.delete(path, id)
    }

    fn commit_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
        self.inner.commit_batch(ops)
    }

    fn listen(&self, path: &CollectionPath, listener: SnapshotListener) -> StoreResult<ListenerId> {
        self.inner.listen(path, listener)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        self.inner.unlisten(id)
    }
}

/// Collection whose store re-delivers the current (stale) remote snapshot
/// before every write, with an observer recording every item list.
fn stale_setup(
    merge: bool,
) -> (OptimisticCollection<Board>, Arc<Mutex<Vec<Vec<String>>>>) {
    let remote = Arc::new(InMemoryDocumentStore::new());
    let store = Arc::new(HookedStore::new(remote.clone()));
    store.set_hook(Arc::new(move |path: &CollectionPath| remote.notify(path)));
    let auth = Arc::new(SessionAuth::signed_in(Principal::new("u1")));
    let config = RepositoryConfig {
        merge_pending_on_snapshot: merge,
        ..RepositoryConfig::default()
    };
    let collection = OptimisticCollection::new(store, auth, vec!["boards".to_string()], config);
    collection.subscribe().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    collection.observe(Arc::new(move |items: &[Board]| {
        sink.lock().unwrap().push(names(items));
    }));
    (collection, seen)
}

#[test]
fn stale_snapshot_keeps_pending_update_when_merging() {
    let (collection, seen) = stale_setup(true);
    let board = collection.create(Board::new("Old")).unwrap();
    seen.lock().unwrap().clear();

    collection
        .update_field(board.id().unwrap(), "name", json!("New"))
        .unwrap();

    assert!(seen.lock().unwrap().iter().all(|names| names == &["New"]));
}

#[test]
fn stale_snapshot_overwrites_pending_update_without_merging() {
    let (collection, seen) = stale_setup(false);
    let board = collection.create(Board::new("Old")).unwrap();
    seen.lock().unwrap().clear();

    collection
        .update_field(board.id().unwrap(), "name", json!("New"))
        .unwrap();

    assert!(seen.lock().unwrap().iter().any(|names| names == &["Old"]));
    assert_eq!(names(&collection.items()), vec!["New"]);
}

#[test]
fn stale_snapshot_keeps_pending_create_and_delete_when_merging() {
    let (collection, seen) = stale_setup(true);
    let doomed = collection.create(Board::new("Doomed")).unwrap();
    seen.lock().unwrap().clear();

    collection.create(Board::new("Fresh")).unwrap();
    collection.delete(doomed.id().unwrap()).unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen
        .iter()
        .take_while(|names| names.iter().any(|name| name == "Doomed"))
        .all(|names| names.iter().any(|name| name == "Fresh")));
    let delete_started = seen.iter().position(|names| names == &["Fresh"]).unwrap();
    assert!(seen[delete_started..]
        .iter()
        .all(|names| !names.iter().any(|name| name == "Doomed")));
    assert_eq!(names(&collection.items()), vec!["Fresh"]);
}

#[test]
fn create_settling_after_teardown_leaves_cache_empty() {
    let remote = Arc::new(InMemoryDocumentStore::new());
    let store = Arc::new(HookedStore::new(remote.clone()));
    let auth = Arc::new(SessionAuth::signed_in(Principal::new("u1")));
    let collection: OptimisticCollection<Board> = OptimisticCollection::new(
        store.clone(),
        auth,
        vec!["boards".to_string()],
        RepositoryConfig::default(),
    );
    let target = collection.clone();
    store.set_hook(Arc::new(move |_path: &CollectionPath| target.teardown()));

    let created = collection.create(Board::new("Late")).unwrap();

    assert!(!created.is_loading());
    assert!(collection.is_empty());
    assert_eq!(collection.status().pending_writes, 0);
    assert_eq!(remote.peek(&boards_path()).len(), 1);
}

#[test]
fn refresh_loads_partial_documents_and_skips_corrupt_ones() {
    let (store, _auth, collection) = setup(RepositoryConfig::default());
    seed(&store, "b1", "Fine");
    let partial = json!({ "name": "Half synced", "is_favorite": null, "member_ids": null })
        .as_object()
        .cloned()
        .unwrap();
    store.create(&boards_path(), Some("b2"), partial).unwrap();
    let corrupt = json!({ "name": 42 }).as_object().cloned().unwrap();
    store.create(&boards_path(), Some("b3"), corrupt).unwrap();

    assert_eq!(collection.refresh().unwrap(), 2);
    assert_eq!(names(&collection.items()), vec!["Fine", "Half synced"]);
    assert!(!collection.get("b2").unwrap().is_favorite);

    collection.subscribe().unwrap();
    seed(&store, "b4", "Live");
    assert_eq!(names(&collection.items()), vec!["Fine", "Half synced", "Live"]);
}

/// Pauses one kind of call until the test releases it.
struct Gate {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl Gate {
    fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Arc::new(Self {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        (gate, entered_rx, release_tx)
    }

    fn pass(&self) {
        self.entered.lock().unwrap().send(()).unwrap();
        self.release.lock().unwrap().recv().unwrap();
    }
}

/// Delegating store whose creates and batches wait on their gates.
struct GatedStore {
    inner: Arc<InMemoryDocumentStore>,
    create: Arc<Gate>,
    batch: Arc<Gate>,
}

impl DocumentStore for GatedStore {
    fn create(
        &self,
        path: &CollectionPath,
        id_hint: Option<&str>,
        data: DocumentData,
    ) -> StoreResult<Document> {
        self.create.pass();
        self.inner.create(path, id_hint, data)
    }

    fn get(&self, path: &CollectionPath, id: &str) -> StoreResult<Option<Document>> {
        self.inner.get(path, id)
    }

    fn list(&self, path: &CollectionPath) -> StoreResult<Vec<Document>> {
        self.inner.list(path)
    }

    fn update(&self, path: &CollectionPath, id: &str, fields: DocumentData) -> StoreResult<Document> {
        self.inner.update(path, id, fields)
    }

    fn set(&self, path: &CollectionPath, id: &str, data: DocumentData) -> StoreResult<Document> {
        self.inner.set(path, id, data)
    }

    fn delete(&self, path: &CollectionPath, id: &str) -> StoreResult<()> {
        self.inner.delete(path, id)
    }

    fn commit_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
        self.batch.pass();
        self.inner.commit_batch(ops)
    }

    fn listen(&self, path: &CollectionPath, listener: SnapshotListener) -> StoreResult<ListenerId> {
        self.inner.listen(path, listener)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        self.inner.unlisten(id)
    }
}

/// Starts a create, starts a failing bulk delete while it is in flight,
/// lets the create settle first, then lets the batch fail.
fn bulk_delete_fails_after_create_settles(create_fails: bool) -> OptimisticCollection<Board> {
    let remote = Arc::new(InMemoryDocumentStore::new());
    seed(&remote, "b1", "Existing");
    let (create_gate, create_entered, release_create) = Gate::new();
    let (batch_gate, batch_entered, release_batch) = Gate::new();
    let store = Arc::new(GatedStore {
        inner: remote.clone(),
        create: create_gate,
        batch: batch_gate,
    });
    let auth = Arc::new(SessionAuth::signed_in(Principal::new("u1")));
    let collection: OptimisticCollection<Board> = OptimisticCollection::new(
        store,
        auth,
        vec!["boards".to_string()],
        RepositoryConfig::default(),
    );
    collection.refresh().unwrap();
    if create_fails {
        remote.fail_next(StoreOperation::Create, "rejected");
    }
    remote.fail_next(StoreOperation::Batch, "quota exceeded");

    let creator = {
        let collection = collection.clone();
        thread::spawn(move || collection.create(Board::new("InFlight")))
    };
    create_entered.recv().unwrap();

    let deleter = {
        let collection = collection.clone();
        thread::spawn(move || collection.bulk_delete())
    };
    batch_entered.recv().unwrap();

    release_create.send(()).unwrap();
    assert_eq!(creator.join().unwrap().is_err(), create_fails);
    release_batch.send(()).unwrap();
    assert!(deleter.join().unwrap().is_err());

    collection
}

#[test]
fn failed_bulk_delete_drops_placeholder_of_failed_create() {
    let collection = bulk_delete_fails_after_create_settles(true);

    let items = collection.items();
    assert!(items.iter().all(|board| !board.is_loading()));
    assert_eq!(names(&items), vec!["Existing"]);
    assert_eq!(collection.status().pending_writes, 0);
}

#[test]
fn failed_bulk_delete_keeps_committed_copy_of_settled_create() {
    let collection = bulk_delete_fails_after_create_settles(false);

    let items = collection.items();
    assert!(items.iter().all(|board| !board.is_loading()));
    assert_eq!(names(&items), vec!["Existing", "InFlight"]);
    assert_eq!(collection.status().pending_writes, 0);
}
