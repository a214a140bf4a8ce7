//! Periodic planner claiming pass windows and running each pass on its own
//! lane task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::orchestrator::{Observation, ObservationContext};
use crate::process::StopHandle;
use crate::satellite::{DecoderMode, ObserverLocation, PassPredictor, PassWindow, SatelliteDescriptor};
use crate::task::{PeriodicWork, TaskError, TaskState};

/// How far back to look for a pass that is already in progress.
const IN_PROGRESS_LOOKBACK_MINUTES: i64 = 30;

/// Extra time a lane gets to finish on shutdown beyond process teardown.
const LANE_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct Lane {
    window: PassWindow,
    stop: StopHandle,
    handle: JoinHandle<()>,
}

/// Asks the predictor for the next window of every satellite that has no
/// pass pending, and spawns a lane that sleeps until the window, captures,
/// then decodes.
///
/// Lanes run outside the scheduler loops so a pass never delays other
/// periodic tasks. Decodes are limited to one at a time per mode.
pub struct ObservationPlanner {
    satellites: Vec<SatelliteDescriptor>,
    observer: ObserverLocation,
    predictor: Arc<dyn PassPredictor>,
    context: ObservationContext,
    lanes: Mutex<HashMap<String, Lane>>,
    last_end: Mutex<HashMap<String, DateTime<Utc>>>,
    decode_slots: HashMap<DecoderMode, Arc<Semaphore>>,
}

impl ObservationPlanner {
    pub fn new(
        satellites: Vec<SatelliteDescriptor>,
        observer: ObserverLocation,
        predictor: Arc<dyn PassPredictor>,
        context: ObservationContext,
    ) -> Self {
        let decode_slots = satellites
            .iter()
            .map(|s| (s.mode, Arc::new(Semaphore::new(1))))
            .collect();
        Self {
            satellites,
            observer,
            predictor,
            context,
            lanes: Mutex::new(HashMap::new()),
            last_end: Mutex::new(HashMap::new()),
            decode_slots,
        }
    }

    /// Windows claimed and not yet finished, by satellite id.
    pub fn pending(&self) -> Vec<(String, PassWindow)> {
        let lanes = match self.lanes.lock() {
            Ok(lanes) => lanes,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut pending: Vec<_> = lanes
            .iter()
            .filter(|(_, lane)| !lane.handle.is_finished())
            .map(|(id, lane)| (id.clone(), lane.window))
            .collect();
        pending.sort_by_key(|(_, window)| window.start);
        pending
    }

    /// Stop every lane: pending passes are cancelled, running captures are
    /// torn down.
    pub async fn shutdown(&self) {
        let lanes: Vec<(String, Lane)> = match self.lanes.lock() {
            Ok(mut lanes) => lanes.drain().collect(),
            Err(poisoned) => poisoned.into_inner().drain().collect(),
        };
        let grace =
            Duration::from_secs(self.context.capture.teardown_timeout_secs) + LANE_SHUTDOWN_GRACE;

        for (_, lane) in &lanes {
            lane.stop.stop();
        }
        for (satellite_id, lane) in lanes {
            let abort = lane.handle.abort_handle();
            if tokio::time::timeout(grace, lane.handle).await.is_err() {
                warn!("Pass lane for {} did not stop within {:?}", satellite_id, grace);
                abort.abort();
            }
        }
    }

    fn next_window(&self, satellite: &SatelliteDescriptor, now: DateTime<Utc>) -> Option<PassWindow> {
        let last_end = match self.last_end.lock() {
            Ok(map) => map.get(&satellite.id).copied(),
            Err(poisoned) => poisoned.into_inner().get(&satellite.id).copied(),
        };
        let mut after = last_end
            .unwrap_or_else(|| now - chrono::Duration::minutes(IN_PROGRESS_LOOKBACK_MINUTES));

        loop {
            let window = self.predictor.next_pass(satellite, &self.observer, after)?;
            if window.start <= after {
                warn!(
                    "Predictor returned a window for {} starting at {} (not after {})",
                    satellite.id, window.start, after
                );
                return None;
            }
            if !window.has_ended(now) {
                return Some(window);
            }
            debug!("Skipping ended pass of {} at {}", satellite.id, window.start);
            after = window.start;
        }
    }

    fn claim(&self, satellite: &SatelliteDescriptor, window: PassWindow) {
        let observation = Observation::new(satellite.clone(), window, self.context.clone());
        let stop = observation.stop_handle();
        let slot = self
            .decode_slots
            .get(&satellite.mode)
            .cloned()
            .unwrap_or_else(|| Arc::new(Semaphore::new(1)));

        info!(
            "Scheduled {} pass {} - {} (max elevation {:.1})",
            satellite.id, window.start, window.end, window.max_elevation
        );
        let handle = tokio::spawn(run_lane(observation, slot));

        if let Ok(mut last_end) = self.last_end.lock() {
            last_end.insert(satellite.id.clone(), window.end);
        }
        if let Ok(mut lanes) = self.lanes.lock() {
            lanes.insert(
                satellite.id.clone(),
                Lane {
                    window,
                    stop,
                    handle,
                },
            );
        }
    }
}

#[async_trait]
impl PeriodicWork for ObservationPlanner {
    fn name(&self) -> &str {
        "planner"
    }

    async fn execute(&self, state: TaskState, now: DateTime<Utc>) -> Result<TaskState, TaskError> {
        let busy: Vec<String> = {
            let mut lanes = self
                .lanes
                .lock()
                .map_err(|_| TaskError::work("pass lanes lock poisoned"))?;
            lanes.retain(|_, lane| !lane.handle.is_finished());
            lanes.keys().cloned().collect()
        };

        for satellite in &self.satellites {
            if busy.contains(&satellite.id) {
                continue;
            }
            match self.next_window(satellite, now) {
                Some(window) => self.claim(satellite, window),
                None => debug!("No upcoming pass for {}", satellite.id),
            }
        }

        Ok(state)
    }
}

async fn run_lane(mut observation: Observation, decode_slot: Arc<Semaphore>) {
    let stop = observation.stop_handle();
    let mut cancelled = stop.signal();

    let until_start = until(observation.window_start());
    tokio::select! {
        _ = tokio::time::sleep(until_start) => {}
        _ = cancelled.stopped() => {
            info!(
                "Pass {}/{} cancelled before start",
                observation.satellite().id,
                observation.id()
            );
            return;
        }
    }

    let until_end = until(observation.window_end());
    let timer = tokio::spawn(async move {
        tokio::time::sleep(until_end).await;
        stop.stop();
    });

    observation.start().await;
    timer.abort();
    observation.stop().await;

    let Ok(_permit) = decode_slot.acquire_owned().await else {
        return;
    };
    observation.decode().await;
    info!(
        "Pass {}/{} finished: {}",
        observation.satellite().id,
        observation.id(),
        observation.state()
    );
}

fn until(deadline: DateTime<Utc>) -> Duration {
    (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use crate::decoder::{DecoderRegistry, SamplePipelineAdapter};
    use crate::satellite::{DemodParams, ScheduledPass, ScheduledPasses};
    use crate::testing::{MockDsp, MockResultStore};
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn noaa() -> SatelliteDescriptor {
        SatelliteDescriptor {
            id: "25338".into(),
            name: "NOAA 15".into(),
            frequency_hz: 137_620_000,
            mode: DecoderMode::Lrpt,
            demod: DemodParams::default(),
        }
    }

    fn planner(dir: &TempDir, windows: Vec<PassWindow>) -> ObservationPlanner {
        let passes = windows
            .into_iter()
            .map(|window| ScheduledPass {
                satellite_id: "25338".into(),
                window,
            })
            .collect();
        let context = ObservationContext {
            capture: CaptureConfig {
                rtl_sdr_path: dir.path().join("missing-rtl_sdr"),
                teardown_timeout_secs: 1,
                work_dir: dir.path().join("work"),
                ..Default::default()
            },
            store: Arc::new(MockResultStore::new()),
            decoder: SamplePipelineAdapter::new(
                Arc::new(DecoderRegistry::with_defaults()),
                Arc::new(MockDsp::new()),
            ),
        };
        ObservationPlanner::new(
            vec![noaa()],
            ObserverLocation::default(),
            Arc::new(ScheduledPasses::from_entries(passes)),
            context,
        )
    }

    fn window(now: DateTime<Utc>, start_min: i64, end_min: i64) -> PassWindow {
        PassWindow::new(
            now + ChronoDuration::minutes(start_min),
            now + ChronoDuration::minutes(end_min),
        )
    }

    #[tokio::test]
    async fn test_does_not_double_schedule() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let first = window(now, 60, 72);
        let planner = planner(&dir, vec![first, window(now, 160, 172)]);

        planner.execute(TaskState::default(), now).await.unwrap();
        planner.execute(TaskState::default(), now).await.unwrap();

        let pending = planner.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0], ("25338".to_string(), first));
        planner.shutdown().await;
    }

    #[tokio::test]
    async fn test_skips_ended_windows() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let upcoming = window(now, 90, 100);
        let planner = planner(&dir, vec![window(now, -25, -15), upcoming]);

        planner.execute(TaskState::default(), now).await.unwrap();
        assert_eq!(planner.pending(), vec![("25338".to_string(), upcoming)]);
        planner.shutdown().await;
    }

    #[tokio::test]
    async fn test_nothing_to_schedule() {
        let dir = TempDir::new().unwrap();
        let planner = planner(&dir, Vec::new());
        let state = planner
            .execute(TaskState::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(state, TaskState::default());
        assert!(planner.pending().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_waiting_lanes() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let planner = planner(&dir, vec![window(now, 600, 610)]);
        planner.execute(TaskState::default(), now).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), planner.shutdown())
            .await
            .expect("waiting lanes should stop promptly");
        assert!(planner.pending().is_empty());
    }

    #[tokio::test]
    async fn test_finished_lane_frees_satellite() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        // Already started: the capture binary is missing so the lane fails fast.
        let current = window(now, -1, 10);
        let next = window(now, 120, 130);
        let planner = planner(&dir, vec![current, next]);

        planner.execute(TaskState::default(), now).await.unwrap();
        for _ in 0..100 {
            if planner.pending().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(planner.pending().is_empty());

        planner.execute(TaskState::default(), now).await.unwrap();
        assert_eq!(planner.pending(), vec![("25338".to_string(), next)]);
        planner.shutdown().await;
    }
}
