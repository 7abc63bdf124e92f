//! Optimistic local cache over one remote per-user collection.
//!
//! # Responsibility
//! - Apply user mutations locally first, write remotely, then reconcile:
//!   confirm with the server copy or roll back to the prior local state.
//! - Mirror live collection snapshots into the cache.
//! - Expose the cache to UI observers.
//!
//! # Invariants
//! - Every pending write has exactly one terminal follow-up (commit or
//!   rollback); placeholders never outlive their create call.
//! - No cache lock is held across a store call or an observer callback.
//! - Entries with an unconfirmed local write survive snapshot merges unless
//!   `merge_pending_on_snapshot` is disabled.
//! - Reconciliation is skipped when the cache was torn down or switched to
//!   another principal while the write was in flight (`epoch` changed).
//! - A cache only ever holds data of one principal.
//! - A document that fails to decode is skipped and logged; the rest of its
//!   collection still loads.

use crate::auth::{AuthProvider, Principal};
use crate::config::{DeleteFailurePolicy, RepositoryConfig};
use crate::model::{
    check_patch_fields, decode_entity, encode_entity, new_document_id, patch_entity, DocumentData,
    Entity,
};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::SessionScoped;
use crate::store::{
    BatchOp, CollectionPath, CollectionSnapshot, Document, DocumentStore, ListenerId,
    SnapshotListener,
};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

/// UI observer receiving the full item list after every local change.
pub type CollectionObserver<T> = Arc<dyn Fn(&[T]) + Send + Sync>;

/// Handle returned by `OptimisticCollection::observe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

/// Point-in-time view of cache bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStatus {
    pub len: usize,
    pub pending_writes: usize,
    pub is_syncing: bool,
    pub is_subscribed: bool,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    kind: PendingKind,
    in_flight: u32,
}

struct CacheState<T> {
    owner: Option<String>,
    items: Vec<T>,
    pending: HashMap<String, PendingWrite>,
    syncing: bool,
    last_error: Option<String>,
    epoch: u64,
}

impl<T: Entity> CacheState<T> {
    fn new() -> Self {
        Self {
            owner: None,
            items: Vec::new(),
            pending: HashMap::new(),
            syncing: false,
            last_error: None,
            epoch: 0,
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == Some(id))
    }

    fn pending_kind(&self, id: &str) -> Option<PendingKind> {
        self.pending.get(id).map(|write| write.kind)
    }

    fn begin(&mut self, id: &str, kind: PendingKind) {
        match self.pending.get_mut(id) {
            Some(write) if write.kind == kind => write.in_flight += 1,
            _ => {
                self.pending
                    .insert(id.to_string(), PendingWrite { kind, in_flight: 1 });
            }
        }
    }

    fn settle(&mut self, id: &str, kind: PendingKind) {
        if let Some(write) = self.pending.get_mut(id) {
            if write.kind != kind {
                return;
            }
            write.in_flight = write.in_flight.saturating_sub(1);
            if write.in_flight == 0 {
                self.pending.remove(id);
            }
        }
    }

    fn reset(&mut self) {
        self.items.clear();
        self.pending.clear();
        self.syncing = false;
        self.last_error = None;
        self.epoch += 1;
    }

    /// Replaces the placeholder `provisional` with the server copy.
    fn commit_created(&mut self, provisional: &str, committed: T) {
        let committed_id = committed.id().unwrap_or_default().to_string();
        match self
            .position(provisional)
            .or_else(|| self.position(&committed_id))
        {
            Some(index) => self.items[index] = committed,
            None => self.items.push(committed),
        }

        let mut seen = false;
        self.items.retain(|item| {
            if item.id() != Some(committed_id.as_str()) {
                return true;
            }
            let keep = !seen;
            seen = true;
            keep
        });
    }

    /// Installs a remote snapshot.
    ///
    /// With `keep_pending`, pending deletes stay removed, pending updates keep
    /// their local patch and pending creates keep a (loading) entry.
    fn merge_snapshot(&mut self, remote: Vec<T>, keep_pending: bool) {
        if !keep_pending {
            self.items = remote;
            return;
        }

        let remote_ids = remote
            .iter()
            .filter_map(|item| item.id().map(str::to_string))
            .collect::<HashSet<_>>();
        let mut merged = Vec::with_capacity(remote.len() + self.pending.len());

        for mut item in remote {
            let id = item.id().unwrap_or_default().to_string();
            match self.pending_kind(&id) {
                Some(PendingKind::Delete) => {}
                Some(PendingKind::Update) => {
                    let local = self.position(&id).map(|index| self.items[index].clone());
                    merged.push(local.unwrap_or(item));
                }
                Some(PendingKind::Create) => {
                    item.set_loading(true);
                    merged.push(item);
                }
                None => merged.push(item),
            }
        }

        for local in &self.items {
            let Some(id) = local.id() else {
                continue;
            };
            if !remote_ids.contains(id) && self.pending_kind(id) == Some(PendingKind::Create) {
                merged.push(local.clone());
            }
        }

        self.items = merged;
    }
}

struct ObserverTable<T> {
    next_id: u64,
    entries: BTreeMap<ObserverId, CollectionObserver<T>>,
}

struct CollectionInner<T: Entity> {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    relative: Vec<String>,
    config: RepositoryConfig,
    state: RwLock<CacheState<T>>,
    subscription: Mutex<Option<ListenerId>>,
    observers: Mutex<ObserverTable<T>>,
}

impl<T: Entity> CollectionInner<T> {
    fn read(&self) -> RwLockReadGuard<'_, CacheState<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscription(&self) -> MutexGuard<'_, Option<ListenerId>> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, ObserverTable<T>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drop_subscription(&self) {
        let previous = self.subscription().take();
        if let Some(id) = previous {
            self.store.unlisten(id);
        }
    }

    fn notify_observers(&self) {
        let observers = self.observers().entries.values().cloned().collect::<Vec<_>>();
        if observers.is_empty() {
            return;
        }
        let items = self.read().items.clone();
        for observer in observers {
            observer(&items);
        }
    }

    fn record_failure(&self, epoch: u64, err: &RepoError) {
        let mut state = self.write();
        if state.epoch == epoch {
            state.last_error = Some(err.user_message());
        }
    }

    fn apply_remote_snapshot(&self, owner: &str, snapshot: &CollectionSnapshot) {
        let items = decode_documents::<T>(&snapshot.path, &snapshot.documents);

        let applied = {
            let mut state = self.write();
            let owned = state.owner.as_deref() == Some(owner);
            if owned {
                state.merge_snapshot(items, self.config.merge_pending_on_snapshot);
            }
            owned
        };

        if applied {
            debug!(
                "event=snapshot_apply module=repo status=ok kind={} collection={} documents={}",
                T::KIND,
                snapshot.path,
                snapshot.documents.len()
            );
            self.notify_observers();
        }
    }
}

struct Binding {
    principal: Principal,
    path: CollectionPath,
}

/// Locally cached, observable mirror of one remote collection.
///
/// Cloning yields another handle to the same cache.
pub struct OptimisticCollection<T: Entity> {
    inner: Arc<CollectionInner<T>>,
}

impl<T: Entity> Clone for OptimisticCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Entity> OptimisticCollection<T> {
    /// Creates an empty cache for the collection at `users/{uid}/<relative>`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        relative: Vec<String>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                store,
                auth,
                relative,
                config,
                state: RwLock::new(CacheState::new()),
                subscription: Mutex::new(None),
                observers: Mutex::new(ObserverTable {
                    next_id: 0,
                    entries: BTreeMap::new(),
                }),
            }),
        }
    }

    /// Collection path relative to the principal's user document.
    pub fn relative_path(&self) -> &[String] {
        &self.inner.relative
    }

    /// Creates `item` optimistically.
    ///
    /// A loading placeholder with a provisional id is visible until the
    /// remote create settles; it is then replaced by the server copy or
    /// removed.
    pub fn create(&self, mut item: T) -> RepoResult<T> {
        item.validate()?;
        let binding = self.bind()?;
        let provisional = new_document_id();
        item.set_id(provisional.clone());
        item.set_loading(true);
        let data = encode_entity(&item)?;

        let epoch = {
            let mut state = self.inner.write();
            state.items.push(item);
            state.begin(&provisional, PendingKind::Create);
            state.epoch
        };
        self.inner.notify_observers();

        let outcome = self
            .inner
            .store
            .create(&binding.path, Some(provisional.as_str()), data)
            .map_err(RepoError::from)
            .and_then(|document| decode_document::<T>(&document));

        match outcome {
            Ok(committed) => {
                {
                    let mut state = self.inner.write();
                    if state.epoch == epoch {
                        state.settle(&provisional, PendingKind::Create);
                        state.commit_created(&provisional, committed.clone());
                    }
                }
                self.inner.notify_observers();
                info!(
                    "event=optimistic_create module=repo status=ok kind={} collection={} id={}",
                    T::KIND,
                    binding.path,
                    committed.id().unwrap_or_default()
                );
                Ok(committed)
            }
            Err(err) => {
                {
                    let mut state = self.inner.write();
                    if state.epoch == epoch {
                        state.settle(&provisional, PendingKind::Create);
                        state
                            .items
                            .retain(|item| item.id() != Some(provisional.as_str()));
                        state.last_error = Some(err.user_message());
                    }
                }
                self.inner.notify_observers();
                error!(
                    "event=optimistic_create module=repo status=rolled_back kind={} collection={} id={} error_code={} error={}",
                    T::KIND,
                    binding.path,
                    provisional,
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Removes `id` locally, then remotely.
    ///
    /// On remote failure the outcome follows `RepositoryConfig::delete_failure`.
    pub fn delete(&self, id: &str) -> RepoResult<()> {
        let binding = self.bind()?;
        let (removed, epoch) = {
            let mut state = self.inner.write();
            if state.pending_kind(id) == Some(PendingKind::Create) {
                return Err(RepoError::PendingCreate(id.to_string()));
            }
            let removed = state
                .position(id)
                .map(|index| (index, state.items.remove(index)));
            if removed.is_some() {
                state.begin(id, PendingKind::Delete);
            }
            (removed, state.epoch)
        };
        if removed.is_some() {
            self.inner.notify_observers();
        }

        let err = match self.inner.store.delete(&binding.path, id) {
            Ok(()) => {
                self.inner.write().settle(id, PendingKind::Delete);
                info!(
                    "event=optimistic_delete module=repo status=ok kind={} collection={} id={}",
                    T::KIND,
                    binding.path,
                    id
                );
                return Ok(());
            }
            Err(err) => RepoError::from(err),
        };

        let policy = self.inner.config.delete_failure;
        {
            let mut state = self.inner.write();
            if state.epoch == epoch {
                state.settle(id, PendingKind::Delete);
                state.last_error = Some(err.user_message());
                if policy == DeleteFailurePolicy::Rollback && state.position(id).is_none() {
                    if let Some((index, prior)) = removed {
                        let at = index.min(state.items.len());
                        state.items.insert(at, prior);
                    }
                }
            }
        }

        match policy {
            DeleteFailurePolicy::KeepLocalRemoval => {
                warn!(
                    "event=optimistic_delete module=repo status=remote_failed_kept_local kind={} collection={} id={} error={}",
                    T::KIND,
                    binding.path,
                    id,
                    err
                );
                Ok(())
            }
            DeleteFailurePolicy::Rollback => {
                self.inner.notify_observers();
                error!(
                    "event=optimistic_delete module=repo status=rolled_back kind={} collection={} id={} error={}",
                    T::KIND,
                    binding.path,
                    id,
                    err
                );
                Err(err)
            }
        }
    }

    /// Sets one field of `id`. See `update_fields`.
    pub fn update_field(&self, id: &str, field: &str, value: Value) -> RepoResult<T> {
        let mut fields = DocumentData::new();
        fields.insert(field.to_string(), value);
        self.update_fields(id, fields)
    }

    /// Patches `id` locally, then remotely; restores the prior value on failure.
    ///
    /// The item must be in the cache; unknown ids fail with `NotFound` and
    /// undeclared field names with a validation error, both without touching
    /// the store.
    pub fn update_fields(&self, id: &str, fields: DocumentData) -> RepoResult<T> {
        if fields.is_empty() {
            return Err(RepoError::InvalidData("empty field patch".to_string()));
        }
        check_patch_fields::<T>(&fields)?;
        let binding = self.bind()?;

        let (prior, epoch) = {
            let mut state = self.inner.write();
            if state.pending_kind(id) == Some(PendingKind::Create) {
                return Err(RepoError::PendingCreate(id.to_string()));
            }
            let index = state
                .position(id)
                .ok_or_else(|| RepoError::NotFound(id.to_string()))?;
            let prior = state.items[index].clone();
            let patched = patch_entity(&prior, &fields)?;
            patched.validate()?;
            state.items[index] = patched;
            state.begin(id, PendingKind::Update);
            (prior, state.epoch)
        };
        self.inner.notify_observers();

        let outcome = self
            .inner
            .store
            .update(&binding.path, id, fields)
            .map_err(RepoError::from)
            .and_then(|document| decode_document::<T>(&document));

        let result = {
            let mut state = self.inner.write();
            let current = state.epoch == epoch;
            if current {
                state.settle(id, PendingKind::Update);
            }
            match outcome {
                Ok(committed) => {
                    if current {
                        if let Some(index) = state.position(id) {
                            state.items[index] = committed.clone();
                        }
                    }
                    Ok(committed)
                }
                Err(err) => {
                    if current {
                        if let Some(index) = state.position(id) {
                            state.items[index] = prior;
                        }
                        state.last_error = Some(err.user_message());
                    }
                    Err(err)
                }
            }
        };
        self.inner.notify_observers();

        match &result {
            Ok(_) => info!(
                "event=optimistic_update module=repo status=ok kind={} collection={} id={}",
                T::KIND,
                binding.path,
                id
            ),
            Err(err) => error!(
                "event=optimistic_update module=repo status=rolled_back kind={} collection={} id={} error={}",
                T::KIND,
                binding.path,
                id,
                err
            ),
        }
        result
    }

    /// Deletes every confirmed item in one remote batch.
    ///
    /// On failure the batched items return to their snapshot positions.
    /// Placeholders of in-flight creates are never batched and keep whatever
    /// state their create settled to. Returns the number of deleted items.
    pub fn bulk_delete(&self) -> RepoResult<usize> {
        let binding = self.bind()?;

        let (snapshot, ids, epoch) = {
            let mut state = self.inner.write();
            let snapshot = state.items.clone();
            let ids = state
                .items
                .iter()
                .filter_map(|item| item.id().map(str::to_string))
                .filter(|id| state.pending_kind(id) != Some(PendingKind::Create))
                .collect::<Vec<_>>();
            let doomed = ids.iter().cloned().collect::<HashSet<_>>();
            state
                .items
                .retain(|item| !item.id().is_some_and(|id| doomed.contains(id)));
            for id in &ids {
                state.begin(id, PendingKind::Delete);
            }
            (snapshot, ids, state.epoch)
        };
        if ids.is_empty() {
            return Ok(0);
        }
        self.inner.notify_observers();

        let ops = ids
            .iter()
            .map(|id| BatchOp::Delete {
                path: binding.path.clone(),
                id: id.clone(),
            })
            .collect::<Vec<_>>();

        match self.inner.store.commit_batch(ops) {
            Ok(()) => {
                {
                    let mut state = self.inner.write();
                    if state.epoch == epoch {
                        for id in &ids {
                            state.settle(id, PendingKind::Delete);
                        }
                    }
                }
                info!(
                    "event=optimistic_bulk_delete module=repo status=ok kind={} collection={} count={}",
                    T::KIND,
                    binding.path,
                    ids.len()
                );
                Ok(ids.len())
            }
            Err(err) => {
                let err = RepoError::from(err);
                {
                    let mut state = self.inner.write();
                    if state.epoch == epoch {
                        for id in &ids {
                            state.settle(id, PendingKind::Delete);
                        }
                        let batched = ids.iter().map(String::as_str).collect::<HashSet<_>>();
                        let current = std::mem::take(&mut state.items);
                        state.items = restore_batched(snapshot, &batched, current);
                        state.last_error = Some(err.user_message());
                    }
                }
                self.inner.notify_observers();
                error!(
                    "event=optimistic_bulk_delete module=repo status=rolled_back kind={} collection={} count={} error={}",
                    T::KIND,
                    binding.path,
                    ids.len(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Attaches a live listener; replaces any earlier one.
    pub fn subscribe(&self) -> RepoResult<()> {
        let binding = self.bind()?;
        self.inner.drop_subscription();

        let weak = Arc::downgrade(&self.inner);
        let owner = binding.principal.uid.clone();
        let listener: SnapshotListener = Arc::new(move |snapshot| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_remote_snapshot(&owner, snapshot);
            }
        });

        let epoch = self.inner.read().epoch;
        let id = match self.inner.store.listen(&binding.path, listener) {
            Ok(id) => id,
            Err(err) => {
                let err = RepoError::from(err);
                self.inner.record_failure(epoch, &err);
                error!(
                    "event=subscribe module=repo status=error kind={} collection={} error={}",
                    T::KIND,
                    binding.path,
                    err
                );
                return Err(err);
            }
        };

        let previous = self.inner.subscription().replace(id);
        if let Some(previous) = previous {
            self.inner.store.unlisten(previous);
        }
        info!(
            "event=subscribe module=repo status=ok kind={} collection={}",
            T::KIND,
            binding.path
        );
        Ok(())
    }

    /// Detaches the live listener, if any. The cache is kept.
    pub fn unsubscribe(&self) {
        self.inner.drop_subscription();
    }

    /// Fetches the collection once and installs it as the cache content.
    ///
    /// Returns the number of cached items afterwards.
    pub fn refresh(&self) -> RepoResult<usize> {
        let binding = self.bind()?;
        let epoch = {
            let mut state = self.inner.write();
            state.syncing = true;
            state.epoch
        };

        let outcome = self
            .inner
            .store
            .list(&binding.path)
            .map_err(RepoError::from)
            .map(|documents| decode_documents::<T>(&binding.path, &documents));

        let result = {
            let mut state = self.inner.write();
            let current = state.epoch == epoch;
            if current {
                state.syncing = false;
            }
            match outcome {
                Ok(items) => {
                    if current {
                        state.merge_snapshot(items, self.inner.config.merge_pending_on_snapshot);
                    }
                    Ok(state.items.len())
                }
                Err(err) => {
                    if current {
                        state.last_error = Some(err.user_message());
                    }
                    Err(err)
                }
            }
        };
        self.inner.notify_observers();

        match &result {
            Ok(count) => debug!(
                "event=refresh module=repo status=ok kind={} collection={} count={}",
                T::KIND,
                binding.path,
                count
            ),
            Err(err) => error!(
                "event=refresh module=repo status=error kind={} collection={} error={}",
                T::KIND,
                binding.path,
                err
            ),
        }
        result
    }

    /// Refreshes only when the cache is empty. Returns whether it fetched.
    ///
    /// A populated cache is trusted as is; this is not a freshness check.
    pub fn refresh_if_empty(&self) -> RepoResult<bool> {
        self.bind()?;
        if !self.inner.read().items.is_empty() {
            return Ok(false);
        }
        self.refresh()?;
        Ok(true)
    }

    /// Cached items in display order.
    pub fn items(&self) -> Vec<T> {
        self.inner.read().items.clone()
    }

    /// Cached item by id; `None` when unknown.
    pub fn get(&self, id: &str) -> Option<T> {
        let state = self.inner.read();
        state.position(id).map(|index| state.items[index].clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    pub fn status(&self) -> CollectionStatus {
        let is_subscribed = self.inner.subscription().is_some();
        let state = self.inner.read();
        CollectionStatus {
            len: state.items.len(),
            pending_writes: state.pending.len(),
            is_syncing: state.syncing,
            is_subscribed,
            owner: state.owner.clone(),
        }
    }

    /// Returns and clears the last failure message.
    pub fn take_last_error(&self) -> Option<String> {
        self.inner.write().last_error.take()
    }

    /// Registers an observer and immediately sends it the current items.
    pub fn observe(&self, observer: CollectionObserver<T>) -> ObserverId {
        let id = {
            let mut observers = self.inner.observers();
            observers.next_id += 1;
            let id = ObserverId(observers.next_id);
            observers.entries.insert(id, observer.clone());
            id
        };
        let items = self.items();
        observer(&items);
        id
    }

    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.inner.observers().entries.remove(&id).is_some()
    }

    /// Detaches the listener and clears cached data and pending writes.
    pub fn teardown(&self) {
        self.inner.drop_subscription();
        let had_items = {
            let mut state = self.inner.write();
            let had_items = !state.items.is_empty();
            state.reset();
            state.owner = None;
            had_items
        };
        if had_items {
            self.inner.notify_observers();
        }
        debug!(
            "event=teardown module=repo status=ok kind={} relative={}",
            T::KIND,
            self.inner.relative.join("/")
        );
    }

    /// Resolves the principal and path, and claims the cache for it.
    fn bind(&self) -> RepoResult<Binding> {
        let principal = self
            .inner
            .auth
            .current_principal()
            .ok_or(RepoError::NotAuthenticated)?;
        let path = CollectionPath::for_user(&principal.uid, &self.inner.relative)?;

        let switched = {
            let mut state = self.inner.write();
            match state.owner.as_deref() {
                Some(owner) if owner == principal.uid => false,
                Some(_) => {
                    state.reset();
                    state.owner = Some(principal.uid.clone());
                    true
                }
                None => {
                    state.owner = Some(principal.uid.clone());
                    false
                }
            }
        };
        if switched {
            self.inner.drop_subscription();
            self.inner.notify_observers();
            info!(
                "event=cache_owner_switch module=repo status=ok kind={} collection={}",
                T::KIND,
                path
            );
        }

        Ok(Binding { principal, path })
    }
}

impl<T: Entity> SessionScoped for OptimisticCollection<T> {
    fn teardown(&self) {
        OptimisticCollection::teardown(self);
    }
}

/// Rebuilds the cache after a failed batch delete.
///
/// Follows `snapshot` order: entries still in `current` keep their current
/// value, `batched` entries absent from `current` come back from the
/// snapshot, anything else is dropped. Entries of `current` unknown to the
/// snapshot are appended.
fn restore_batched<T: Entity>(
    snapshot: Vec<T>,
    batched: &HashSet<&str>,
    mut current: Vec<T>,
) -> Vec<T> {
    let mut restored = Vec::with_capacity(snapshot.len() + current.len());
    for prior in snapshot {
        let live = prior
            .id()
            .and_then(|id| current.iter().position(|item| item.id() == Some(id)))
            .map(|index| current.remove(index));
        match live {
            Some(item) => restored.push(item),
            None if prior.id().is_some_and(|id| batched.contains(id)) => restored.push(prior),
            None => {}
        }
    }
    restored.extend(current);
    restored
}

/// Decodes a listed collection, skipping documents that do not decode.
fn decode_documents<T: Entity>(path: &CollectionPath, documents: &[Document]) -> Vec<T> {
    documents
        .iter()
        .filter_map(|document| match decode_document::<T>(document) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(
                    "event=document_decode module=repo status=skipped kind={} collection={} id={} error_code={}",
                    T::KIND,
                    path,
                    document.id,
                    err.code()
                );
                None
            }
        })
        .collect()
}

fn decode_document<T: Entity>(document: &Document) -> RepoResult<T> {
    decode_entity(&document.id, &document.data).map_err(|err| {
        RepoError::InvalidData(format!("{} `{}`: {err}", T::KIND, document.id))
    })
}
