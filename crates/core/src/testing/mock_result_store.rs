//! Mock result store for testing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

use crate::store::{Artifact, ObservationRecord, ResultStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<(String, String), ObservationRecord>,
    created: usize,
    metadata_writes: usize,
}

/// In-memory [`ResultStore`]. Files stay where they are.
#[derive(Debug, Default)]
pub struct MockResultStore {
    inner: Mutex<Inner>,
}

impl MockResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of observations registered.
    pub fn created(&self) -> usize {
        self.inner.lock().map(|i| i.created).unwrap_or(0)
    }

    /// Number of successful `save_metadata` calls.
    pub fn metadata_writes(&self) -> usize {
        self.inner.lock().map(|i| i.metadata_writes).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database("mock store poisoned".to_string()))
    }

    fn not_found(satellite_id: &str, id: &str) -> StoreError {
        StoreError::NotFound {
            satellite_id: satellite_id.to_string(),
            id: id.to_string(),
        }
    }
}

impl ResultStore for MockResultStore {
    fn create_observation(
        &self,
        satellite_id: &str,
        id: &str,
        raw_path: &Path,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let key = (satellite_id.to_string(), id.to_string());
        if inner.records.contains_key(&key) {
            return Ok(false);
        }
        inner.records.insert(
            key,
            ObservationRecord {
                satellite_id: satellite_id.to_string(),
                id: id.to_string(),
                raw_path: raw_path.to_path_buf(),
                start: None,
                end: None,
                decoded_records: 0,
                artifacts: Vec::new(),
                created_at: Utc::now(),
            },
        );
        inner.created += 1;
        Ok(true)
    }

    fn find(&self, satellite_id: &str, id: &str) -> Result<Option<ObservationRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .get(&(satellite_id.to_string(), id.to_string()))
            .cloned())
    }

    fn save_artifact(
        &self,
        satellite_id: &str,
        id: &str,
        path: &Path,
        channel: &str,
    ) -> Result<PathBuf, StoreError> {
        let mut inner = self.lock()?;
        let record = inner
            .records
            .get_mut(&(satellite_id.to_string(), id.to_string()))
            .ok_or_else(|| Self::not_found(satellite_id, id))?;
        record.artifacts.retain(|a| a.channel != channel);
        record.artifacts.push(Artifact {
            channel: channel.to_string(),
            path: path.to_path_buf(),
        });
        Ok(path.to_path_buf())
    }

    fn save_metadata(
        &self,
        satellite_id: &str,
        record: &ObservationRecord,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let stored = inner
            .records
            .get_mut(&(satellite_id.to_string(), record.id.clone()))
            .ok_or_else(|| Self::not_found(satellite_id, &record.id))?;
        stored.start = record.start;
        stored.end = record.end;
        stored.decoded_records = record.decoded_records;
        inner.metadata_writes += 1;
        Ok(())
    }
}
