//! Observation lifecycle integration tests.
//!
//! These tests drive whole passes against the SQLite result store with
//! stand-in capture tools and a mock DSP toolkit:
//! - Capture, register, decode and persist an LRPT image
//! - Weak signal passes still record metadata
//! - Record counts never leak from one pass into the next
//! - The planner runs a scheduled pass end to end
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tempfile::TempDir;

use groundstation_core::{
    config::CaptureConfig,
    decoder::{BeaconDecoder, DecoderRegistry, SamplePipelineAdapter},
    observation::{Observation, ObservationContext, ObservationPlanner, ObservationState},
    satellite::{
        DecoderMode, DemodParams, ObserverLocation, PassWindow, SatelliteDescriptor,
        ScheduledPass, ScheduledPasses,
    },
    store::{ResultStore, SqliteResultStore},
    task::{InvocationOutcome, MemoryStateStore, ResilientTask},
    testing::{fake_capture_tools, wav_bytes, MockDsp},
};

/// Test helper wiring a real result store to fake capture tools.
struct TestHarness {
    store: Arc<SqliteResultStore>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteResultStore::new(
                &temp_dir.path().join("test.db"),
                temp_dir.path().join("observations"),
            )
            .expect("Failed to create result store"),
        );
        Self { store, temp_dir }
    }

    fn context(&self, dsp: MockDsp) -> ObservationContext {
        let payload = wav_bytes(2, 150_000, 16, &[0; 256]);
        let (rtl_sdr, sox) = fake_capture_tools(self.temp_dir.path(), &payload);
        ObservationContext {
            capture: CaptureConfig {
                rtl_sdr_path: rtl_sdr,
                sox_path: sox,
                teardown_timeout_secs: 1,
                work_dir: self.temp_dir.path().join("work"),
                ..Default::default()
            },
            store: self.store.clone(),
            decoder: SamplePipelineAdapter::new(
                Arc::new(DecoderRegistry::with_defaults()),
                Arc::new(dsp),
            ),
        }
    }
}

fn meteor() -> SatelliteDescriptor {
    SatelliteDescriptor {
        id: "40069".into(),
        name: "METEOR-M 2".into(),
        frequency_hz: 137_100_000,
        mode: DecoderMode::Lrpt,
        demod: DemodParams::default(),
    }
}

fn jy1sat() -> SatelliteDescriptor {
    SatelliteDescriptor {
        id: "43803".into(),
        name: "JY1SAT".into(),
        frequency_hz: 145_840_000,
        mode: DecoderMode::Jy1sat,
        demod: DemodParams::default(),
    }
}

fn window_at(hour: u32) -> PassWindow {
    let start = Utc.with_ymd_and_hms(2026, 10, 19, hour, 0, 0).unwrap();
    PassWindow::new(start, start + ChronoDuration::minutes(12))
}

#[tokio::test]
async fn test_lrpt_pass_persists_image() {
    let harness = TestHarness::new();
    let dsp = MockDsp::new()
        .with_frames(vec![vec![0u8; 1024]; 4])
        .with_image(b"\xff\xd8jpeg".to_vec());
    let window = window_at(12);
    let mut obs = Observation::new(meteor(), window, harness.context(dsp));

    obs.start().await;
    obs.stop().await;
    assert_eq!(obs.state(), ObservationState::Captured);

    let record = obs.decode().await.expect("pass should decode");
    assert_eq!(obs.state(), ObservationState::Decoded);
    assert_eq!(record.decoded_records, 4);
    assert_eq!(record.start, Some(window.start));
    assert_eq!(record.end, Some(window.end));

    let dir = harness.store.observation_dir("40069", obs.id().as_str());
    assert_eq!(record.raw_path, dir.join("raw.wav"));
    assert!(record.raw_path.exists());

    let image = record.artifact("a").expect("image artifact");
    assert_eq!(image.path, dir.join("a.jpg"));
    assert_eq!(std::fs::read(&image.path).unwrap(), b"\xff\xd8jpeg");

    let stored = harness
        .store
        .find("40069", obs.id().as_str())
        .unwrap()
        .unwrap();
    assert_eq!(stored.decoded_records, 4);
    assert!(stored.is_decoded());
}

#[tokio::test]
async fn test_weak_signal_records_zero_without_artifact() {
    let harness = TestHarness::new();
    let mut obs = Observation::new(meteor(), window_at(13), harness.context(MockDsp::new()));

    obs.start().await;
    obs.stop().await;
    let record = obs.decode().await.expect("metadata should still be saved");

    assert_eq!(record.decoded_records, 0);
    assert!(record.artifacts.is_empty());
    assert_eq!(record.start, Some(window_at(13).start));
    assert_eq!(obs.state(), ObservationState::Decoded);
}

#[tokio::test]
async fn test_record_counts_are_per_pass() {
    let harness = TestHarness::new();
    let frames = vec![vec![0x41u8; BeaconDecoder::FRAME_LEN]; 5];

    let mut first = Observation::new(
        jy1sat(),
        window_at(14),
        harness.context(MockDsp::new().with_frames(frames.clone())),
    );
    first.start().await;
    first.stop().await;
    let first_record = first.decode().await.unwrap();

    let mut second = Observation::new(
        jy1sat(),
        window_at(15),
        harness.context(MockDsp::new().with_frames(frames[..2].to_vec())),
    );
    second.start().await;
    second.stop().await;
    let second_record = second.decode().await.unwrap();

    assert_eq!(first_record.decoded_records, 5);
    assert_eq!(second_record.decoded_records, 2);

    let data = second_record.artifact("data").expect("telemetry artifact");
    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&data.path).unwrap()).unwrap();
    assert_eq!(json.as_array().map(|a| a.len()), Some(2));
}

#[tokio::test]
async fn test_same_window_registers_once() {
    let harness = TestHarness::new();
    let window = window_at(16);

    let mut first = Observation::new(jy1sat(), window, harness.context(MockDsp::new()));
    first.start().await;
    first.stop().await;
    assert_eq!(first.state(), ObservationState::Captured);

    let mut duplicate = Observation::new(jy1sat(), window, harness.context(MockDsp::new()));
    duplicate.start().await;
    duplicate.stop().await;
    assert_eq!(duplicate.state(), ObservationState::Failed);
    assert!(!duplicate.raw_path().unwrap().exists());
    assert!(duplicate.decode().await.is_none());
}

#[tokio::test]
async fn test_planner_runs_scheduled_pass() {
    let harness = TestHarness::new();
    let dsp = MockDsp::new().with_frames(vec![vec![0x41u8; BeaconDecoder::FRAME_LEN]; 3]);

    let start = Utc::now() + ChronoDuration::milliseconds(200);
    let window = PassWindow::new(start, start + ChronoDuration::milliseconds(800));
    let predictor = ScheduledPasses::from_entries(vec![ScheduledPass {
        satellite_id: "43803".into(),
        window,
    }]);

    let planner = ResilientTask::new(
        ObservationPlanner::new(
            vec![jy1sat()],
            ObserverLocation::default(),
            Arc::new(predictor),
            harness.context(dsp),
        ),
        Arc::new(MemoryStateStore::new()),
    )
    .unwrap();

    assert_eq!(planner.invoke_at(Utc::now()).await, InvocationOutcome::Completed);
    assert_eq!(planner.work().pending().len(), 1);

    let id = window.start.timestamp_millis().to_string();
    let mut decoded = None;
    for _ in 0..100 {
        if planner.work().pending().is_empty() {
            decoded = harness.store.find("43803", &id).unwrap();
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let record = decoded.expect("scheduled pass should be decoded");
    assert_eq!(record.decoded_records, 3);
    assert!(record.artifact("data").is_some());

    // The schedule has nothing after this window.
    assert_eq!(planner.invoke_at(Utc::now()).await, InvocationOutcome::Completed);
    assert!(planner.work().pending().is_empty());
    planner.work().shutdown().await;
}
