use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::{Operation, StoreError};
use crate::http_cache::app_cache_dir;
use crate::rules::{Session, authorize};

const DB_FILE: &str = "documents.sqlite";

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub data: Value,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.data.clone()).map_err(|source| StoreError::Decode {
            path: self.path.clone(),
            source,
        })
    }
}

/// One change inside a document, addressed by a dotted field path (`teams.33`).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set { field: String, value: Value },
    Delete { field: String },
    Increment { field: String, by: i64 },
}

impl FieldUpdate {
    pub fn set(field: impl Into<String>, value: Value) -> Self {
        FieldUpdate::Set {
            field: field.into(),
            value,
        }
    }

    pub fn delete(field: impl Into<String>) -> Self {
        FieldUpdate::Delete {
            field: field.into(),
        }
    }

    pub fn increment(field: impl Into<String>, by: i64) -> Self {
        FieldUpdate::Increment {
            field: field.into(),
            by,
        }
    }
}

/// Raw document storage. Access rules live in [`Db`], not here.
pub trait DocumentStore: Send + Sync {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, path: &str, value: Value, merge: bool) -> Result<(), StoreError>;
    /// Applies field updates in order; a missing document starts out empty.
    fn update(&self, path: &str, updates: &[FieldUpdate]) -> Result<(), StoreError>;
    fn delete(&self, path: &str) -> Result<(), StoreError>;
    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;
    /// Receives the current snapshot immediately, then one per write.
    fn subscribe(&self, path: &str) -> Receiver<Option<Value>>;

    fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        let docs = self.list(collection)?;
        Ok(docs
            .into_iter()
            .filter(|doc| field_get(&doc.data, field) == Some(value))
            .collect())
    }
}

type Watchers = HashMap<String, Vec<Sender<Option<Value>>>>;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    watchers: Mutex<Watchers>,
}

impl SqliteStore {
    pub fn default_path() -> Option<PathBuf> {
        app_cache_dir().map(|dir| dir.join(DB_FILE))
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open sqlite db {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            watchers: Mutex::new(HashMap::new()),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self, conn: &Connection, path: &str) -> Result<Option<Value>, StoreError> {
        let raw = conn
            .query_row(
                "SELECT body FROM documents WHERE path = ?1",
                params![path],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|source| backend(path, source))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let value = serde_json::from_str(&raw).map_err(|source| StoreError::Decode {
            path: path.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    fn write(&self, conn: &Connection, path: &str, value: &Value) -> Result<(), StoreError> {
        let (collection, doc_id) = split_doc_path(path)?;
        let body = value.to_string();
        conn.execute(
            r#"
            INSERT INTO documents (path, collection, doc_id, body, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(path) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
            params![path, collection, doc_id, body, Utc::now().to_rfc3339()],
        )
        .map_err(|source| backend(path, source))?;
        Ok(())
    }

    fn notify(&self, path: &str, snapshot: Option<Value>) {
        let mut watchers = self
            .watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(list) = watchers.get_mut(path) {
            list.retain(|tx| tx.send(snapshot.clone()).is_ok());
            if list.is_empty() {
                watchers.remove(path);
            }
        }
    }
}

impl DocumentStore for SqliteStore {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        split_doc_path(path)?;
        let conn = self.conn();
        self.read(&conn, path)
    }

    fn set(&self, path: &str, value: Value, merge: bool) -> Result<(), StoreError> {
        let stored = {
            let conn = self.conn();
            let next = if merge {
                let mut current = self.read(&conn, path)?.unwrap_or_else(empty_object);
                merge_into(&mut current, value);
                current
            } else {
                value
            };
            self.write(&conn, path, &next)?;
            next
        };
        self.notify(path, Some(stored));
        Ok(())
    }

    fn update(&self, path: &str, updates: &[FieldUpdate]) -> Result<(), StoreError> {
        let stored = {
            let conn = self.conn();
            let mut current = self.read(&conn, path)?.unwrap_or_else(empty_object);
            for update in updates {
                apply_update(&mut current, update);
            }
            self.write(&conn, path, &current)?;
            current
        };
        self.notify(path, Some(stored));
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), StoreError> {
        split_doc_path(path)?;
        {
            let conn = self.conn();
            conn.execute("DELETE FROM documents WHERE path = ?1", params![path])
                .map_err(|source| backend(path, source))?;
        }
        self.notify(path, None);
        Ok(())
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT path, doc_id, body FROM documents WHERE collection = ?1 ORDER BY doc_id ASC",
            )
            .map_err(|source| backend(collection, source))?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|source| backend(collection, source))?;

        let mut out = Vec::new();
        for row in rows {
            let (path, id, body) = row.map_err(|source| backend(collection, source))?;
            let data = serde_json::from_str(&body).map_err(|source| StoreError::Decode {
                path: path.clone(),
                source,
            })?;
            out.push(Document { id, path, data });
        }
        Ok(out)
    }

    fn subscribe(&self, path: &str) -> Receiver<Option<Value>> {
        let (tx, rx) = mpsc::channel();
        let current = self.get(path).ok().flatten();
        let _ = tx.send(current);
        self.watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(path.to_string())
            .or_default()
            .push(tx);
        rx
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            path TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Store handle bound to a session; every call is checked against the access rules.
#[derive(Clone)]
pub struct Db {
    store: Arc<dyn DocumentStore>,
    session: Session,
}

impl Db {
    pub fn new(store: Arc<dyn DocumentStore>, session: Session) -> Self {
        Self { store, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Same backing store, different caller.
    pub fn with_session(&self, session: Session) -> Self {
        Self {
            store: Arc::clone(&self.store),
            session,
        }
    }

    pub fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        authorize(&self.session, Operation::Get, path, None)?;
        self.store.get(path)
    }

    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let Some(value) = self.get(path)? else {
            return Ok(None);
        };
        let doc = Document {
            id: doc_id(path).to_string(),
            path: path.to_string(),
            data: value,
        };
        doc.decode().map(Some)
    }

    pub fn set<T: Serialize>(&self, path: &str, value: &T, merge: bool) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Decode {
            path: path.to_string(),
            source,
        })?;
        // Writing over an existing document is checked as an update.
        let operation = if self.store.get(path)?.is_some() {
            Operation::Update
        } else {
            Operation::Set
        };
        authorize(&self.session, operation, path, Some(&value))?;
        self.store.set(path, value, merge)
    }

    pub fn update(&self, path: &str, updates: &[FieldUpdate]) -> Result<(), StoreError> {
        let payload = updates_payload(updates);
        authorize(&self.session, Operation::Update, path, Some(&payload))?;
        self.store.update(path, updates)
    }

    pub fn delete(&self, path: &str) -> Result<(), StoreError> {
        authorize(&self.session, Operation::Delete, path, None)?;
        self.store.delete(path)
    }

    pub fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        authorize(&self.session, Operation::List, collection, None)?;
        self.store.list(collection)
    }

    pub fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        authorize(&self.session, Operation::List, collection, None)?;
        self.store.query(collection, field, value)
    }

    pub fn subscribe(&self, path: &str) -> Result<Receiver<Option<Value>>, StoreError> {
        authorize(&self.session, Operation::Get, path, None)?;
        Ok(self.store.subscribe(path))
    }
}

/// Top-level fields touched by `updates`, used as the payload rules inspect.
///
/// Increments show up as `{"increment": by}` so rules can tell them from sets.
fn updates_payload(updates: &[FieldUpdate]) -> Value {
    let mut obj = Map::new();
    for update in updates {
        let (field, value) = match update {
            FieldUpdate::Set { field, value } => (field, value.clone()),
            FieldUpdate::Delete { field } => (field, Value::Null),
            FieldUpdate::Increment { field, by } => {
                let mut inc = Map::new();
                inc.insert("increment".to_string(), Value::from(*by));
                (field, Value::Object(inc))
            }
        };
        let root = field.split('.').next().unwrap_or(field);
        obj.insert(root.to_string(), value);
    }
    Value::Object(obj)
}

pub fn doc_id(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn split_doc_path(path: &str) -> Result<(&str, &str), StoreError> {
    let segments = path.split('/').count();
    if segments < 2 || segments % 2 != 0 || path.split('/').any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    path.rsplit_once('/')
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))
}

fn backend(path: &str, source: rusqlite::Error) -> StoreError {
    StoreError::Backend {
        path: path.to_string(),
        source,
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

pub fn field_get<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

fn apply_update(doc: &mut Value, update: &FieldUpdate) {
    match update {
        FieldUpdate::Set { field, value } => {
            if let Some(slot) = field_slot(doc, field) {
                *slot = value.clone();
            }
        }
        FieldUpdate::Delete { field } => {
            let (parent, leaf) = match field.rsplit_once('.') {
                Some((parent, leaf)) => (field_get_mut(doc, parent), leaf),
                None => (Some(&mut *doc), field.as_str()),
            };
            if let Some(Value::Object(map)) = parent {
                map.remove(leaf);
            }
        }
        FieldUpdate::Increment { field, by } => {
            if let Some(slot) = field_slot(doc, field) {
                let current = slot.as_i64().unwrap_or(0);
                *slot = Value::from(current.saturating_add(*by));
            }
        }
    }
}

/// Walks to `field`, creating intermediate objects; `None` if a non-object is in the way.
fn field_slot<'a>(doc: &'a mut Value, field: &str) -> Option<&'a mut Value> {
    let mut current = doc;
    for key in field.split('.') {
        if current.is_null() {
            *current = empty_object();
        }
        current = current
            .as_object_mut()?
            .entry(key.to_string())
            .or_insert(Value::Null);
    }
    Some(current)
}

fn field_get_mut<'a>(doc: &'a mut Value, field: &str) -> Option<&'a mut Value> {
    field
        .split('.')
        .try_fold(doc, |current, key| current.as_object_mut()?.get_mut(key))
}

/// Deep merge of objects; non-object values in `patch` replace the target.
fn merge_into(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                let nested = value.is_object() && target.get(&key).is_some_and(Value::is_object);
                if !nested {
                    target.insert(key, value);
                } else if let Some(existing) = target.get_mut(&key) {
                    merge_into(existing, value);
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
