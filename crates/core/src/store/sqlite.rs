//! SQLite-backed result store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::types::{Artifact, ObservationRecord, StoreError};
use super::ResultStore;

/// Observation rows in SQLite, files under `<base_dir>/<satellite>/<id>/`.
pub struct SqliteResultStore {
    conn: Mutex<Connection>,
    base_dir: PathBuf,
}

impl SqliteResultStore {
    /// Open the store, creating tables if needed.
    pub fn new(path: &Path, base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            base_dir: base_dir.into(),
        })
    }

    /// Create an in-memory store (useful for testing). Files still go
    /// under `base_dir`.
    pub fn in_memory(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            base_dir: base_dir.into(),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS observations (
                satellite_id TEXT NOT NULL,
                id TEXT NOT NULL,
                raw_path TEXT NOT NULL,
                start_at TEXT,
                end_at TEXT,
                decoded_records INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                PRIMARY KEY (satellite_id, id)
            );

            CREATE TABLE IF NOT EXISTS artifacts (
                satellite_id TEXT NOT NULL,
                observation_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                path TEXT NOT NULL,
                PRIMARY KEY (satellite_id, observation_id, channel)
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    /// Directory holding the files of one observation.
    pub fn observation_dir(&self, satellite_id: &str, id: &str) -> PathBuf {
        self.base_dir.join(satellite_id).join(id)
    }

    fn exists(conn: &Connection, satellite_id: &str, id: &str) -> Result<bool, StoreError> {
        let found = conn
            .query_row(
                "SELECT 1 FROM observations WHERE satellite_id = ? AND id = ?",
                params![satellite_id, id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn load_artifacts(
        conn: &Connection,
        satellite_id: &str,
        id: &str,
    ) -> Result<Vec<Artifact>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT channel, path FROM artifacts
             WHERE satellite_id = ? AND observation_id = ? ORDER BY channel",
        )?;
        let rows = stmt.query_map(params![satellite_id, id], |row| {
            let path: String = row.get(1)?;
            Ok(Artifact {
                channel: row.get(0)?,
                path: PathBuf::from(path),
            })
        })?;

        let mut artifacts = Vec::new();
        for row in rows {
            artifacts.push(row?);
        }
        Ok(artifacts)
    }
}

impl ResultStore for SqliteResultStore {
    fn create_observation(
        &self,
        satellite_id: &str,
        id: &str,
        raw_path: &Path,
    ) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        if Self::exists(&conn, satellite_id, id)? {
            debug!("Observation {}/{} already registered", satellite_id, id);
            return Ok(false);
        }

        let dest = self
            .observation_dir(satellite_id, id)
            .join(file_name("raw", raw_path));

        // The row is only committed once the file is in place.
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO observations (satellite_id, id, raw_path, created_at) VALUES (?, ?, ?, ?)",
            params![
                satellite_id,
                id,
                dest.to_string_lossy().to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        move_file(raw_path, &dest)?;
        if let Err(e) = tx.commit() {
            if let Err(back) = move_file(&dest, raw_path) {
                warn!(
                    "Unable to restore {} after failed insert: {}",
                    raw_path.display(),
                    back
                );
            }
            return Err(e.into());
        }

        info!("Registered observation {}/{}", satellite_id, id);
        Ok(true)
    }

    fn find(&self, satellite_id: &str, id: &str) -> Result<Option<ObservationRecord>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT raw_path, start_at, end_at, decoded_records, created_at
                 FROM observations WHERE satellite_id = ? AND id = ?",
                params![satellite_id, id],
                |row| {
                    let raw_path: String = row.get(0)?;
                    let start: Option<String> = row.get(1)?;
                    let end: Option<String> = row.get(2)?;
                    let decoded_records: i64 = row.get(3)?;
                    let created_at: String = row.get(4)?;
                    Ok((raw_path, start, end, decoded_records, created_at))
                },
            )
            .optional()?;

        let Some((raw_path, start, end, decoded_records, created_at)) = row else {
            return Ok(None);
        };

        Ok(Some(ObservationRecord {
            satellite_id: satellite_id.to_string(),
            id: id.to_string(),
            raw_path: PathBuf::from(raw_path),
            start: start.as_deref().and_then(parse_timestamp),
            end: end.as_deref().and_then(parse_timestamp),
            decoded_records: decoded_records.max(0) as u64,
            artifacts: Self::load_artifacts(&conn, satellite_id, id)?,
            created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
        }))
    }

    fn save_artifact(
        &self,
        satellite_id: &str,
        id: &str,
        path: &Path,
        channel: &str,
    ) -> Result<PathBuf, StoreError> {
        let conn = self.lock()?;
        if !Self::exists(&conn, satellite_id, id)? {
            return Err(StoreError::NotFound {
                satellite_id: satellite_id.to_string(),
                id: id.to_string(),
            });
        }

        let dest = self
            .observation_dir(satellite_id, id)
            .join(file_name(channel, path));
        move_file(path, &dest)?;

        conn.execute(
            "INSERT INTO artifacts (satellite_id, observation_id, channel, path)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(satellite_id, observation_id, channel) DO UPDATE SET path = excluded.path",
            params![satellite_id, id, channel, dest.to_string_lossy().to_string()],
        )?;
        debug!(
            "Saved {} artifact for {}/{}: {}",
            channel,
            satellite_id,
            id,
            dest.display()
        );
        Ok(dest)
    }

    fn save_metadata(
        &self,
        satellite_id: &str,
        record: &ObservationRecord,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE observations SET start_at = ?, end_at = ?, decoded_records = ?
             WHERE satellite_id = ? AND id = ?",
            params![
                record.start.map(|t| t.to_rfc3339()),
                record.end.map(|t| t.to_rfc3339()),
                record.decoded_records as i64,
                satellite_id,
                record.id
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                satellite_id: satellite_id.to_string(),
                id: record.id.clone(),
            });
        }
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// `<stem>.<ext of source>`, or just `<stem>` when the source has none.
fn file_name(stem: &str, source: &Path) -> String {
    match source.extension() {
        Some(ext) => format!("{}.{}", stem, ext.to_string_lossy()),
        None => stem.to_string(),
    }
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), StoreError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| StoreError::Io { path, source }
    };

    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(io_err(from))?;
    std::fs::remove_file(from).map_err(io_err(from))?;
    Ok(())
}
