//! Pass predictor seam and a schedule-file backed implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{ObserverLocation, PassWindow, SatelliteDescriptor};

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("failed to read pass schedule {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse pass schedule: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Produces upcoming visibility windows.
pub trait PassPredictor: Send + Sync {
    /// First window for `satellite` starting strictly after `after`.
    fn next_pass(
        &self,
        satellite: &SatelliteDescriptor,
        observer: &ObserverLocation,
        after: DateTime<Utc>,
    ) -> Option<PassWindow>;
}

/// One entry of a schedule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPass {
    pub satellite_id: String,
    #[serde(flatten)]
    pub window: PassWindow,
}

/// Pass windows precomputed by an external predictor for this station.
///
/// When created from a file the schedule is re-read whenever the file's
/// modification time changes, so the predictor can refresh it in place.
pub struct ScheduledPasses {
    path: Option<PathBuf>,
    inner: RwLock<Schedule>,
}

#[derive(Default)]
struct Schedule {
    modified: Option<SystemTime>,
    passes: HashMap<String, Vec<PassWindow>>,
}

impl Schedule {
    fn from_entries(entries: Vec<ScheduledPass>) -> Self {
        let mut passes: HashMap<String, Vec<PassWindow>> = HashMap::new();
        for entry in entries {
            passes.entry(entry.satellite_id).or_default().push(entry.window);
        }
        for windows in passes.values_mut() {
            windows.sort_by_key(|w| w.start);
        }
        Self {
            modified: None,
            passes,
        }
    }
}

impl ScheduledPasses {
    /// Schedule with a fixed set of windows.
    pub fn from_entries(entries: Vec<ScheduledPass>) -> Self {
        Self {
            path: None,
            inner: RwLock::new(Schedule::from_entries(entries)),
        }
    }

    /// Load a JSON array of [`ScheduledPass`] entries.
    pub fn load(path: &Path) -> Result<Self, PredictorError> {
        let schedule = Self {
            path: Some(path.to_path_buf()),
            inner: RwLock::new(Schedule::default()),
        };
        schedule.reload()?;
        Ok(schedule)
    }

    fn reload(&self) -> Result<(), PredictorError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| PredictorError::Io {
            path: path.clone(),
            source,
        };
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(io_err)?;

        if let Ok(inner) = self.inner.read() {
            if inner.modified == Some(modified) {
                return Ok(());
            }
        }

        let raw = std::fs::read_to_string(path).map_err(io_err)?;
        let entries: Vec<ScheduledPass> = serde_json::from_str(&raw)?;
        debug!("Loaded {} scheduled passes from {:?}", entries.len(), path);

        let mut schedule = Schedule::from_entries(entries);
        schedule.modified = Some(modified);
        if let Ok(mut inner) = self.inner.write() {
            *inner = schedule;
        }
        Ok(())
    }
}

impl PassPredictor for ScheduledPasses {
    fn next_pass(
        &self,
        satellite: &SatelliteDescriptor,
        _observer: &ObserverLocation,
        after: DateTime<Utc>,
    ) -> Option<PassWindow> {
        if let Err(e) = self.reload() {
            warn!("Keeping previous pass schedule: {}", e);
        }
        let inner = self.inner.read().ok()?;
        inner
            .passes
            .get(&satellite.id)?
            .iter()
            .find(|w| w.start > after)
            .copied()
    }
}
