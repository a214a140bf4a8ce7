//! Runs a decoder variant over a captured sample file.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use super::dsp::Dsp;
use super::error::DecodeError;
use super::registry::DecoderRegistry;
use super::source::WavSource;
use super::types::{DecodeResult, RecordCounter};
use crate::metrics::{DECODED_RECORDS, DECODE_DURATION};
use crate::satellite::SatelliteDescriptor;

/// Turns a raw capture into a typed decode result.
#[derive(Clone)]
pub struct SamplePipelineAdapter {
    registry: Arc<DecoderRegistry>,
    dsp: Arc<dyn Dsp>,
}

impl SamplePipelineAdapter {
    pub fn new(registry: Arc<DecoderRegistry>, dsp: Arc<dyn Dsp>) -> Self {
        Self { registry, dsp }
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    /// Decode `raw_path` with the variant for `satellite.mode`.
    ///
    /// Never fails: any fault is logged with the sample path and yields
    /// `None`. A result with no image or no records is a weak pass, not a
    /// fault.
    pub async fn decode(
        &self,
        raw_path: &Path,
        satellite: &SatelliteDescriptor,
    ) -> Option<DecodeResult> {
        let adapter = self.clone();
        let path = raw_path.to_path_buf();
        let sat = satellite.clone();
        let mode = satellite.mode;
        let started = Instant::now();

        let outcome = tokio::task::spawn_blocking(move || adapter.decode_blocking(&path, &sat))
            .await
            .unwrap_or_else(|e| Err(DecodeError::Aborted(e.to_string())));

        let elapsed = started.elapsed().as_secs_f64();
        match outcome {
            Ok(result) => {
                let label = if result.output.has_artifact() {
                    "ok"
                } else {
                    "empty"
                };
                DECODE_DURATION
                    .with_label_values(&[mode.as_str(), label])
                    .observe(elapsed);
                info!(
                    "Decoded {} for {}: {} records",
                    raw_path.display(),
                    satellite.id,
                    result.decoded_records
                );
                Some(result)
            }
            Err(e) => {
                DECODE_DURATION
                    .with_label_values(&[mode.as_str(), "failed"])
                    .observe(elapsed);
                error!("Unable to decode {}: {}", raw_path.display(), e);
                None
            }
        }
    }

    /// Synchronous decode; runs on a blocking thread.
    pub fn decode_blocking(
        &self,
        raw_path: &Path,
        satellite: &SatelliteDescriptor,
    ) -> Result<DecodeResult, DecodeError> {
        let variant = self
            .registry
            .resolve(satellite.mode)
            .ok_or(DecodeError::UnknownMode(satellite.mode))?;

        let source = WavSource::open(raw_path)?;
        debug!(
            "Decoding {} sample frames at {} Hz from {}",
            source.frame_count(),
            source.sample_rate(),
            raw_path.display()
        );
        let chain = variant.chain(&source, satellite);
        let frames = self.dsp.frames(&source, &chain)?;

        let mut counter = RecordCounter::new();
        let output = variant.interpret(frames, self.dsp.as_ref(), &mut counter)?;

        DECODED_RECORDS
            .with_label_values(&[satellite.mode.as_str()])
            .inc_by(counter.count());

        Ok(DecodeResult {
            output,
            decoded_records: counter.count(),
        })
    }
}
