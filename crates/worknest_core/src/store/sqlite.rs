//! SQLite-backed document store for on-device use.
//!
//! # Responsibility
//! - Persist documents as JSON rows keyed by `(collection, doc_id)`.
//! - Provide the same listener semantics as the hosted database.
//!
//! # Invariants
//! - `seq` preserves creation order; `set`/`update` keep the original row.
//! - Batches run in one SQLite transaction.
//! - Listeners fire only after the write transaction committed.
//! - A listener sees every write committed after its initial snapshot.
//! - Lock order is `conn` before `listeners`.

use super::listeners::{deliver, ListenerTable, PendingDelivery};
use super::{
    merge_fields, BatchOp, CollectionPath, CollectionSnapshot, Document, DocumentStore,
    ListenerId, SnapshotListener, StoreError, StoreResult,
};
use crate::db::{open_db, open_db_in_memory};
use crate::model::{new_document_id, now_epoch_ms, DocumentData};
use log::{debug, error};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// `DocumentStore` persisted in a local SQLite database.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    listeners: Mutex<ListenerTable>,
}

impl SqliteDocumentStore {
    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            listeners: Mutex::new(ListenerTable::default()),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, ListenerTable> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshots for every listener on `paths`, read after the write.
    fn collect_deliveries<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a CollectionPath>,
    ) -> StoreResult<Vec<PendingDelivery>> {
        let watching = self.listeners().watching(paths);
        if watching.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        watching
            .into_iter()
            .map(|(path, listeners)| {
                let documents = list_documents(&conn, &path)?;
                Ok((CollectionSnapshot { path, documents }, listeners))
            })
            .collect()
    }

    fn notify<'a>(&self, paths: impl IntoIterator<Item = &'a CollectionPath>) {
        // The write already committed; a failed re-read only loses one push.
        match self.collect_deliveries(paths) {
            Ok(deliveries) => deliver(deliveries),
            Err(err) => error!(
                "event=store_notify module=store status=error error={}",
                err
            ),
        }
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn create(
        &self,
        path: &CollectionPath,
        id_hint: Option<&str>,
        data: DocumentData,
    ) -> StoreResult<Document> {
        let id = id_hint.map_or_else(new_document_id, str::to_string);
        {
            let conn = self.conn();
            if read_document(&conn, path, &id)?.is_some() {
                return Err(StoreError::AlreadyExists {
                    path: path.to_string(),
                    id,
                });
            }
            insert_or_replace(&conn, path, &id, &data)?;
        }
        debug!("event=store_write module=store op=create path={path} id={id}");
        self.notify([path]);
        Ok(Document { id, data })
    }

    fn get(&self, path: &CollectionPath, id: &str) -> StoreResult<Option<Document>> {
        read_document(&self.conn(), path, id)
    }

    fn list(&self, path: &CollectionPath) -> StoreResult<Vec<Document>> {
        list_documents(&self.conn(), path)
    }

    fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: DocumentData,
    ) -> StoreResult<Document> {
        let document = {
            let conn = self.conn();
            let mut document = read_document(&conn, path, id)?.ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
                id: id.to_string(),
            })?;
            merge_fields(&mut document.data, fields);
            insert_or_replace(&conn, path, id, &document.data)?;
            document
        };
        self.notify([path]);
        Ok(document)
    }

    fn set(&self, path: &CollectionPath, id: &str, data: DocumentData) -> StoreResult<Document> {
        insert_or_replace(&self.conn(), path, id, &data)?;
        self.notify([path]);
        Ok(Document {
            id: id.to_string(),
            data,
        })
    }

    fn delete(&self, path: &CollectionPath, id: &str) -> StoreResult<()> {
        self.conn().execute(
            "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2;",
            params![path.to_string(), id],
        )?;
        self.notify([path]);
        Ok(())
    }

    fn commit_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
        let touched = ops.iter().map(|op| op.path().clone()).collect::<Vec<_>>();
        {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            for op in ops {
                match op {
                    BatchOp::Set { path, id, data } => insert_or_replace(&tx, &path, &id, &data)?,
                    BatchOp::Update { path, id, fields } => {
                        let mut document =
                            read_document(&tx, &path, &id)?.ok_or_else(|| StoreError::NotFound {
                                path: path.to_string(),
                                id: id.clone(),
                            })?;
                        merge_fields(&mut document.data, fields);
                        insert_or_replace(&tx, &path, &id, &document.data)?;
                    }
                    BatchOp::Delete { path, id } => {
                        tx.execute(
                            "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2;",
                            params![path.to_string(), id],
                        )?;
                    }
                }
            }
            tx.commit()?;
        }
        self.notify(touched.iter());
        Ok(())
    }

    fn listen(&self, path: &CollectionPath, listener: SnapshotListener) -> StoreResult<ListenerId> {
        // No write can commit between the read and the registration.
        let (id, documents) = {
            let conn = self.conn();
            let documents = list_documents(&conn, path)?;
            let id = self.listeners().register(path.clone(), listener.clone());
            (id, documents)
        };
        listener(&CollectionSnapshot {
            path: path.clone(),
            documents,
        });
        Ok(id)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        self.listeners().remove(id)
    }
}

fn insert_or_replace(
    conn: &Connection,
    path: &CollectionPath,
    id: &str,
    data: &DocumentData,
) -> StoreResult<()> {
    let body = serde_json::to_string(data)?;
    conn.execute(
        "INSERT INTO documents (collection, doc_id, body, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (collection, doc_id)
         DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at;",
        params![path.to_string(), id, body, now_epoch_ms()],
    )?;
    Ok(())
}

fn read_document(conn: &Connection, path: &CollectionPath, id: &str) -> StoreResult<Option<Document>> {
    let body = conn
        .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND doc_id = ?2;",
            params![path.to_string(), id],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    body.map(|body| parse_document(id.to_string(), &body))
        .transpose()
}

fn list_documents(conn: &Connection, path: &CollectionPath) -> StoreResult<Vec<Document>> {
    let mut stmt = conn.prepare(
        "SELECT doc_id, body FROM documents WHERE collection = ?1 ORDER BY seq ASC;",
    )?;
    let mut rows = stmt.query([path.to_string()])?;
    let mut documents = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let body: String = row.get(1)?;
        documents.push(parse_document(id, &body)?);
    }
    Ok(documents)
}

fn parse_document(id: String, body: &str) -> StoreResult<Document> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(data) => Ok(Document { id, data }),
        other => Err(StoreError::Serialization(serde::de::Error::custom(format!(
            "document `{id}` body is not an object: {other}"
        )))),
    }
}
