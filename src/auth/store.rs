// Persistent key-value storage for credentials

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use thiserror::Error;

/// Errors emitted by token stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Key must not be empty")]
    EmptyKey,

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Key-value store holding the token type and the token pair
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Write several entries as one unit.
    /// Backends that can do this atomically override it.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

/// Read a stored value and parse it as JSON
pub fn get_json<T: DeserializeOwned>(
    store: &dyn TokenStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize a value as JSON and store it
pub fn set_json<T: Serialize>(store: &dyn TokenStore, key: &str, value: &T) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::EmptyKey);
    }
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// In-memory store for tests and short-lived sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with the given entries
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            entries: RwLock::new(map),
        }
    }
}

impl TokenStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn set_many(&self, pairs: &[(&str, &str)]) -> Result<(), StoreError> {
        if pairs.iter().any(|(k, _)| k.is_empty()) {
            return Err(StoreError::EmptyKey);
        }
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        for (key, value) in pairs {
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

/// SQLite-backed store using an `auth_kv` table
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                // Surfaced by the open call below if this fails
                let _ = std::fs::create_dir_all(parent);
            }
        }
        tracing::debug!("Opening token store: {}", path.display());
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS auth_kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// RFC 3339 timestamp of the last write to `key`
    pub fn updated_at(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let value = conn
            .query_row(
                "SELECT updated_at FROM auth_kv WHERE key = ?",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

const UPSERT_SQL: &str = "INSERT INTO auth_kv (key, value, updated_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

impl TokenStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let value = conn
            .query_row("SELECT value FROM auth_kv WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute("DELETE FROM auth_kv WHERE key = ?", [key])?;
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        if entries.iter().any(|(k, _)| k.is_empty()) {
            return Err(StoreError::EmptyKey);
        }
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT_SQL)?;
            for (key, value) in entries {
                stmt.execute([*key, *value, now.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
