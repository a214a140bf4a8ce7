//! Types for the result store.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A file produced from a pass, tagged by channel (`a`, `data`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub channel: String,
    pub path: PathBuf,
}

/// Durable record of one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub satellite_id: String,
    pub id: String,
    /// Raw capture, after it was moved into the store.
    pub raw_path: PathBuf,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub decoded_records: u64,
    pub artifacts: Vec<Artifact>,
    pub created_at: DateTime<Utc>,
}

impl ObservationRecord {
    /// Artifact stored under `channel`, if any.
    pub fn artifact(&self, channel: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.channel == channel)
    }

    /// Whether decode metadata was saved.
    pub fn is_decoded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }
}

/// Errors that can occur in the result store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Observation not found: {satellite_id}/{id}")]
    NotFound { satellite_id: String, id: String },

    #[error("Failed to move {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
