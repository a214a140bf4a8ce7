//! Persistence of observations and their artifacts.

mod sqlite;
mod types;

pub use sqlite::SqliteResultStore;
pub use types::{Artifact, ObservationRecord, StoreError};

use std::path::{Path, PathBuf};

/// Durable home of observation metadata and files.
pub trait ResultStore: Send + Sync {
    /// Register a raw capture. Returns `false` if the observation already
    /// exists, in which case nothing is changed.
    fn create_observation(
        &self,
        satellite_id: &str,
        id: &str,
        raw_path: &Path,
    ) -> Result<bool, StoreError>;

    fn find(&self, satellite_id: &str, id: &str) -> Result<Option<ObservationRecord>, StoreError>;

    /// Attach `path` to the observation under `channel`. Returns where the
    /// artifact now lives.
    fn save_artifact(
        &self,
        satellite_id: &str,
        id: &str,
        path: &Path,
        channel: &str,
    ) -> Result<PathBuf, StoreError>;

    /// Persist window bounds and decoded-record count of `record`.
    fn save_metadata(&self, satellite_id: &str, record: &ObservationRecord)
        -> Result<(), StoreError>;
}
