//! In-memory document store with fault injection.
//!
//! # Responsibility
//! - Stand in for the hosted document database in tests and the CLI.
//! - Let callers script failures (`fail_next`, `set_offline`) and count calls.
//!
//! # Invariants
//! - Collections keep creation order; `set` on an existing id keeps its slot.
//! - A scripted failure is consumed by exactly one call of that operation.
//! - Failed calls never mutate state nor notify listeners.

use super::listeners::{deliver, ListenerTable, PendingDelivery};
use super::{
    merge_fields, BatchOp, CollectionPath, CollectionSnapshot, Document, DocumentStore,
    ListenerId, SnapshotListener, StoreError, StoreOperation, StoreResult,
};
use crate::model::{new_document_id, DocumentData};
use log::debug;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<CollectionPath, Vec<Document>>,
    listeners: ListenerTable,
    faults: HashMap<StoreOperation, VecDeque<String>>,
    offline: bool,
    calls: HashMap<StoreOperation, usize>,
}

impl MemoryState {
    /// Records the call and returns a scripted failure when one applies.
    fn admit(&mut self, op: StoreOperation) -> StoreResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        if self.offline {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        if let Some(message) = self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(StoreError::Unavailable(message));
        }
        Ok(())
    }

    fn documents(&self, path: &CollectionPath) -> Vec<Document> {
        self.collections.get(path).cloned().unwrap_or_default()
    }

    fn find(&self, path: &CollectionPath, id: &str) -> Option<&Document> {
        self.collections
            .get(path)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id))
    }

    fn upsert(&mut self, path: &CollectionPath, document: Document) {
        let docs = self.collections.entry(path.clone()).or_default();
        match docs.iter_mut().find(|doc| doc.id == document.id) {
            Some(slot) => *slot = document,
            None => docs.push(document),
        }
    }

    fn remove(&mut self, path: &CollectionPath, id: &str) {
        if let Some(docs) = self.collections.get_mut(path) {
            docs.retain(|doc| doc.id != id);
            if docs.is_empty() {
                self.collections.remove(path);
            }
        }
    }

    fn deliveries<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a CollectionPath>,
    ) -> Vec<PendingDelivery> {
        self.listeners
            .watching(paths)
            .into_iter()
            .map(|(path, listeners)| {
                let documents = self.documents(&path);
                (CollectionSnapshot { path, documents }, listeners)
            })
            .collect()
    }
}

/// Thread-safe in-process `DocumentStore`.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    state: Mutex<MemoryState>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of `op` fail with `message`. Calls queue up.
    pub fn fail_next(&self, op: StoreOperation, message: impl Into<String>) {
        self.lock()
            .faults
            .entry(op)
            .or_default()
            .push_back(message.into());
    }

    /// While offline every call fails with `StoreError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Number of calls made for `op`, including failed ones.
    pub fn call_count(&self, op: StoreOperation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Documents currently stored in `path`, bypassing faults and counters.
    pub fn peek(&self, path: &CollectionPath) -> Vec<Document> {
        self.lock().documents(path)
    }

    /// Re-delivers the current snapshot of `path` to its listeners.
    pub fn notify(&self, path: &CollectionPath) {
        let deliveries = self.lock().deliveries([path]);
        deliver(deliveries);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn create(
        &self,
        path: &CollectionPath,
        id_hint: Option<&str>,
        data: DocumentData,
    ) -> StoreResult<Document> {
        let (document, deliveries) = {
            let mut state = self.lock();
            state.admit(StoreOperation::Create)?;
            let id = id_hint.map_or_else(new_document_id, str::to_string);
            if state.find(path, &id).is_some() {
                return Err(StoreError::AlreadyExists {
                    path: path.to_string(),
                    id,
                });
            }
            let document = Document { id, data };
            state.upsert(path, document.clone());
            (document, state.deliveries([path]))
        };
        debug!("event=store_write module=store op=create path={path} id={}", document.id);
        deliver(deliveries);
        Ok(document)
    }

    fn get(&self, path: &CollectionPath, id: &str) -> StoreResult<Option<Document>> {
        let mut state = self.lock();
        state.admit(StoreOperation::Get)?;
        Ok(state.find(path, id).cloned())
    }

    fn list(&self, path: &CollectionPath) -> StoreResult<Vec<Document>> {
        let mut state = self.lock();
        state.admit(StoreOperation::List)?;
        Ok(state.documents(path))
    }

    fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: DocumentData,
    ) -> StoreResult<Document> {
        let (document, deliveries) = {
            let mut state = self.lock();
            state.admit(StoreOperation::Update)?;
            let mut document = state.find(path, id).cloned().ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
                id: id.to_string(),
            })?;
            merge_fields(&mut document.data, fields);
            state.upsert(path, document.clone());
            (document, state.deliveries([path]))
        };
        deliver(deliveries);
        Ok(document)
    }

    fn set(&self, path: &CollectionPath, id: &str, data: DocumentData) -> StoreResult<Document> {
        let (document, deliveries) = {
            let mut state = self.lock();
            state.admit(StoreOperation::Set)?;
            let document = Document {
                id: id.to_string(),
                data,
            };
            state.upsert(path, document.clone());
            (document, state.deliveries([path]))
        };
        deliver(deliveries);
        Ok(document)
    }

    fn delete(&self, path: &CollectionPath, id: &str) -> StoreResult<()> {
        let deliveries = {
            let mut state = self.lock();
            state.admit(StoreOperation::Delete)?;
            state.remove(path, id);
            state.deliveries([path])
        };
        deliver(deliveries);
        Ok(())
    }

    fn commit_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
        let deliveries = {
            let mut state = self.lock();
            state.admit(StoreOperation::Batch)?;

            // Validate every update target first so the batch stays all-or-nothing.
            for op in &ops {
                if let BatchOp::Update { path, id, .. } = op {
                    if state.find(path, id).is_none() {
                        return Err(StoreError::NotFound {
                            path: path.to_string(),
                            id: id.clone(),
                        });
                    }
                }
            }

            let touched = ops.iter().map(|op| op.path().clone()).collect::<Vec<_>>();
            for op in ops {
                match op {
                    BatchOp::Set { path, id, data } => state.upsert(&path, Document { id, data }),
                    BatchOp::Update { path, id, fields } => {
                        if let Some(mut document) = state.find(&path, &id).cloned() {
                            merge_fields(&mut document.data, fields);
                            state.upsert(&path, document);
                        }
                    }
                    BatchOp::Delete { path, id } => state.remove(&path, &id),
                }
            }
            state.deliveries(touched.iter())
        };
        deliver(deliveries);
        Ok(())
    }

    fn listen(&self, path: &CollectionPath, listener: SnapshotListener) -> StoreResult<ListenerId> {
        let (id, snapshot) = {
            let mut state = self.lock();
            state.admit(StoreOperation::Listen)?;
            let id = state.listeners.register(path.clone(), listener.clone());
            let snapshot = CollectionSnapshot {
                path: path.clone(),
                documents: state.documents(path),
            };
            (id, snapshot)
        };
        listener(&snapshot);
        Ok(id)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        self.lock().listeners.remove(id)
    }
}
