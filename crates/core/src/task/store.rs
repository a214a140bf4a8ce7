//! Key/value store for task state that must survive a restart.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state database error: {0}")]
    Database(String),

    #[error("corrupt state value {value:?} for key {key}")]
    Corrupt { key: String, value: String },
}

impl From<rusqlite::Error> for StateError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// One mutation in a batch applied atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Set(String, String),
    Remove(String),
}

/// Persistent configuration-like key/value pairs.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StateError>;

    /// All entries whose key starts with `prefix`.
    fn entries_with_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StateError>;

    /// Apply every change or none of them.
    fn apply(&self, changes: &[StateChange]) -> Result<(), StateError>;
}

/// SQLite-backed state store sharing the station database.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open the store, creating the `settings` table if needed.
    pub fn new(path: &Path) -> Result<Self, StateError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StateError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StateError> {
        self.conn
            .lock()
            .map_err(|_| StateError::Database("connection lock poisoned".to_string()))
    }
}

impl StateStore for SqliteStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn entries_with_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut entries = Vec::new();
        for row in rows {
            let (key, value): (String, String) = row?;
            if key.starts_with(prefix) {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }

    fn apply(&self, changes: &[StateChange]) -> Result<(), StateError> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for change in changes {
            match change {
                StateChange::Set(key, value) => {
                    tx.execute(
                        "INSERT INTO settings (key, value) VALUES (?1, ?2)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                        params![key, value],
                    )?;
                }
                StateChange::Remove(key) => {
                    tx.execute("DELETE FROM settings WHERE key = ?", params![key])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// In-memory state store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StateError> {
        self.entries
            .lock()
            .map_err(|_| StateError::Database("state lock poisoned".to_string()))
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn entries_with_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StateError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn apply(&self, changes: &[StateChange]) -> Result<(), StateError> {
        let mut entries = self.lock()?;
        for change in changes {
            match change {
                StateChange::Set(key, value) => {
                    entries.insert(key.clone(), value.clone());
                }
                StateChange::Remove(key) => {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }
}
