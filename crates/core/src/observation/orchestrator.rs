//! One satellite pass, from capture start to decoded artifact.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::capture::{allocate_raw_file, capture_commands, has_capture};
use super::types::{ObservationId, ObservationState};
use crate::config::CaptureConfig;
use crate::decoder::{DecodeResult, SamplePipelineAdapter};
use crate::metrics::OBSERVATIONS_TOTAL;
use crate::process::{shutdown_pipe, OutputPolicy, PipeEnd, ProcessPipe, StopHandle};
use crate::satellite::{PassWindow, SatelliteDescriptor};
use crate::store::{ObservationRecord, ResultStore};

/// Collaborators shared by every observation.
#[derive(Clone)]
pub struct ObservationContext {
    pub capture: CaptureConfig,
    pub store: Arc<dyn ResultStore>,
    pub decoder: SamplePipelineAdapter,
}

/// Drives a single pass through `Created → Capturing → Captured → Decoded`.
///
/// Methods take `&mut self`; one pass is driven by one task. Faults never
/// escape: they are logged and move the observation to `Failed`.
pub struct Observation {
    id: ObservationId,
    satellite: SatelliteDescriptor,
    window: PassWindow,
    context: ObservationContext,
    stop: StopHandle,
    pipe: Option<ProcessPipe>,
    raw_path: Option<PathBuf>,
    artifact_path: Option<PathBuf>,
    decoded_records: u64,
    state: ObservationState,
}

impl Observation {
    pub fn new(
        satellite: SatelliteDescriptor,
        window: PassWindow,
        context: ObservationContext,
    ) -> Self {
        Self {
            id: ObservationId::from_window(&window),
            satellite,
            window,
            context,
            stop: StopHandle::new(),
            pipe: None,
            raw_path: None,
            artifact_path: None,
            decoded_records: 0,
            state: ObservationState::Created,
        }
    }

    pub fn id(&self) -> &ObservationId {
        &self.id
    }

    pub fn satellite(&self) -> &SatelliteDescriptor {
        &self.satellite
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window.start
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.window.end
    }

    pub fn state(&self) -> ObservationState {
        self.state
    }

    /// Capture file, once allocated.
    pub fn raw_path(&self) -> Option<&Path> {
        self.raw_path.as_deref()
    }

    /// Stored artifact, once decoded.
    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    pub fn decoded_records(&self) -> u64 {
        self.decoded_records
    }

    /// Handle that ends [`Observation::start`] from another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Capture until the stop handle fires or the tuner stream ends.
    pub async fn start(&mut self) {
        if self.state != ObservationState::Created {
            warn!(
                "Observation {}/{} already started ({})",
                self.satellite.id, self.id, self.state
            );
            return;
        }

        let raw_path = match allocate_raw_file(
            &self.context.capture.work_dir,
            &self.satellite.id,
            self.id.as_str(),
        ) {
            Ok(path) => path,
            Err(e) => {
                error!(
                    "Unable to create capture file in {}: {}",
                    self.context.capture.work_dir.display(),
                    e
                );
                self.fail();
                return;
            }
        };
        self.raw_path = Some(raw_path.clone());

        let commands = capture_commands(&self.context.capture, &self.satellite, &raw_path);
        let teardown = Duration::from_secs(self.context.capture.teardown_timeout_secs);
        let pipe = match ProcessPipe::spawn(&commands, OutputPolicy::Inherit, teardown).await {
            Ok(pipe) => pipe,
            Err(e) => {
                error!("Unable to start capture for {}: {}", self.satellite.id, e);
                discard(&raw_path);
                self.fail();
                return;
            }
        };

        info!(
            "Capturing {} ({} Hz) into {}",
            self.satellite.name,
            self.satellite.frequency_hz,
            raw_path.display()
        );
        self.state = ObservationState::Capturing;

        let pipe = self.pipe.insert(pipe);
        let report = pipe.run(self.stop.signal()).await;
        if let PipeEnd::Failed(reason) = &report.end {
            warn!(
                "Capture of {}/{} ended early: {}",
                self.satellite.id, self.id, reason
            );
        }
    }

    /// Tear the capture down and register the raw file.
    pub async fn stop(&mut self) {
        shutdown_pipe(self.pipe.as_mut()).await;
        self.pipe = None;

        match self.state {
            ObservationState::Created | ObservationState::Capturing => {}
            _ => return,
        }

        let raw_path = match &self.raw_path {
            Some(path) if has_capture(path) => path.clone(),
            other => {
                info!("Nothing saved for {}/{}", self.satellite.id, self.id);
                if let Some(path) = other {
                    discard(path);
                }
                self.fail();
                return;
            }
        };

        match self
            .context
            .store
            .create_observation(&self.satellite.id, self.id.as_str(), &raw_path)
        {
            Ok(true) => self.state = ObservationState::Captured,
            Ok(false) => {
                warn!(
                    "Observation {}/{} was already registered",
                    self.satellite.id, self.id
                );
                discard(&raw_path);
                self.fail();
            }
            Err(e) => {
                error!(
                    "Unable to register capture {}: {}",
                    raw_path.display(),
                    e
                );
                self.fail();
            }
        }
    }

    /// Decode the registered capture and persist the outcome.
    ///
    /// Returns `None` without side effects when no capture was registered,
    /// the observation failed, or it was already decoded.
    pub async fn decode(&mut self) -> Option<ObservationRecord> {
        match self.state {
            ObservationState::Failed | ObservationState::Decoded => {
                debug!(
                    "Observation {}/{} is {}, skipping decode",
                    self.satellite.id, self.id, self.state
                );
                return None;
            }
            _ => {}
        }
        let store = Arc::clone(&self.context.store);
        let mut record = match store.find(&self.satellite.id, self.id.as_str()) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(
                    "No registered capture for {}/{}, skipping decode",
                    self.satellite.id, self.id
                );
                return None;
            }
            Err(e) => {
                error!(
                    "Unable to look up {}/{}: {}",
                    self.satellite.id, self.id, e
                );
                return None;
            }
        };

        let result = self
            .context
            .decoder
            .decode(&record.raw_path, &self.satellite)
            .await;

        if let Some(result) = &result {
            self.artifact_path = self.save_artifact(store.as_ref(), result);
        }

        record.start = Some(self.window.start);
        record.end = Some(self.window.end);
        record.decoded_records = result.as_ref().map_or(0, |r| r.decoded_records);
        self.decoded_records = record.decoded_records;

        if let Err(e) = store.save_metadata(&self.satellite.id, &record) {
            error!(
                "Unable to save metadata for {}/{}: {}",
                self.satellite.id, self.id, e
            );
            self.fail();
            return None;
        }

        self.state = ObservationState::Decoded;
        OBSERVATIONS_TOTAL
            .with_label_values(&[self.satellite.id.as_str(), self.state.as_str()])
            .inc();

        match store.find(&self.satellite.id, self.id.as_str()) {
            Ok(Some(saved)) => Some(saved),
            _ => Some(record),
        }
    }

    fn save_artifact(&self, store: &dyn ResultStore, result: &DecodeResult) -> Option<PathBuf> {
        let kind = result.output.kind();
        let bytes = match result.artifact_bytes() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                info!(
                    "No {} decoded from {}/{}",
                    kind.channel(),
                    self.satellite.id,
                    self.id
                );
                return None;
            }
            Err(e) => {
                error!("Unable to serialize records of {}: {}", self.id, e);
                return None;
            }
        };

        let staged = match self.stage_artifact(&bytes, kind.extension()) {
            Ok(path) => path,
            Err(e) => {
                error!("Unable to write artifact for {}: {}", self.id, e);
                return None;
            }
        };

        match store.save_artifact(
            &self.satellite.id,
            self.id.as_str(),
            &staged,
            kind.channel(),
        ) {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Unable to save artifact {}: {}", staged.display(), e);
                discard(&staged);
                None
            }
        }
    }

    fn stage_artifact(&self, bytes: &[u8], extension: &str) -> std::io::Result<PathBuf> {
        let work_dir = &self.context.capture.work_dir;
        std::fs::create_dir_all(work_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", self.satellite.id, self.id))
            .suffix(&format!(".{}", extension))
            .tempfile_in(work_dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.into_temp_path().keep().map_err(|e| e.error)
    }

    fn fail(&mut self) {
        self.state = ObservationState::Failed;
        OBSERVATIONS_TOTAL
            .with_label_values(&[self.satellite.id.as_str(), self.state.as_str()])
            .inc();
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        // kill_on_drop reaps whatever a dropped pipe still holds.
        if self.pipe.as_ref().is_some_and(|p| p.live_stages() > 0) {
            warn!(
                "Observation {}/{} dropped with a live capture",
                self.satellite.id, self.id
            );
        }
    }
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!("Unable to remove {}: {}", path.display(), e);
    }
}
