//! Decoder variants, one per satellite mode.

use tracing::debug;

use super::dsp::{BpskChain, ChainSpec, Dsp, FrameStream, LrptChain};
use super::error::DecodeError;
use super::source::WavSource;
use super::types::{DecodeOutput, DecodedRecord, OutputKind, RecordCounter};
use crate::satellite::SatelliteDescriptor;

/// Knows which chain a mode needs and what its frames mean.
///
/// Variants hold no mutable state; each call builds a fresh chain.
pub trait DecoderVariant: Send + Sync {
    fn name(&self) -> &str;

    fn output_kind(&self) -> OutputKind;

    /// Chain parameters for this capture.
    fn chain(&self, source: &WavSource, satellite: &SatelliteDescriptor) -> ChainSpec;

    /// Drain `frames` into the variant's output, counting records.
    fn interpret(
        &self,
        frames: FrameStream,
        dsp: &dyn Dsp,
        counter: &mut RecordCounter,
    ) -> Result<DecodeOutput, DecodeError>;
}

/// METEOR-M LRPT imagery.
#[derive(Debug, Default)]
pub struct LrptDecoder;

impl DecoderVariant for LrptDecoder {
    fn name(&self) -> &str {
        "lrpt"
    }

    fn output_kind(&self) -> OutputKind {
        OutputKind::Image
    }

    fn chain(&self, source: &WavSource, satellite: &SatelliteDescriptor) -> ChainSpec {
        let sample_rate = satellite
            .demod
            .sample_rate
            .unwrap_or_else(|| source.sample_rate());
        let symbol_rate = satellite.demod.baud_rate.unwrap_or(LrptChain::SYMBOL_RATE);
        ChainSpec::Lrpt(LrptChain::with_symbol_rate(sample_rate, symbol_rate))
    }

    fn interpret(
        &self,
        frames: FrameStream,
        dsp: &dyn Dsp,
        counter: &mut RecordCounter,
    ) -> Result<DecodeOutput, DecodeError> {
        let mut collected = Vec::new();
        for frame in frames {
            collected.push(frame?);
            counter.increment();
        }
        if collected.is_empty() {
            debug!("No LRPT frames synchronized");
            return Ok(DecodeOutput::Image(None));
        }
        Ok(DecodeOutput::Image(dsp.render_image(&collected)?))
    }
}

/// JY1SAT telemetry beacon.
#[derive(Debug, Default)]
pub struct BeaconDecoder;

impl BeaconDecoder {
    /// Length of a beacon frame in bytes.
    pub const FRAME_LEN: usize = 256;

    /// Split a frame into header fields and body. Frames of the wrong
    /// length are noise that passed the sync check.
    pub fn parse_frame(sequence: u64, frame: &[u8]) -> Option<DecodedRecord> {
        if frame.len() != Self::FRAME_LEN {
            return None;
        }
        Some(DecodedRecord {
            sequence,
            satellite_id: frame[0] >> 6,
            frame_type: frame[0] & 0x3f,
            payload: frame[1..].to_vec(),
        })
    }
}

impl DecoderVariant for BeaconDecoder {
    fn name(&self) -> &str {
        "jy1sat"
    }

    fn output_kind(&self) -> OutputKind {
        OutputKind::Records
    }

    fn chain(&self, source: &WavSource, satellite: &SatelliteDescriptor) -> ChainSpec {
        let sample_rate = satellite
            .demod
            .sample_rate
            .unwrap_or_else(|| source.sample_rate());
        let mut chain = BpskChain::jy1sat(sample_rate);
        if let Some(baud) = satellite.demod.baud_rate {
            chain.baud_rate = baud;
        }
        ChainSpec::Bpsk(chain)
    }

    fn interpret(
        &self,
        frames: FrameStream,
        _dsp: &dyn Dsp,
        counter: &mut RecordCounter,
    ) -> Result<DecodeOutput, DecodeError> {
        let mut records = Vec::new();
        for frame in frames {
            let frame = frame?;
            match Self::parse_frame(records.len() as u64, &frame) {
                Some(record) => {
                    records.push(record);
                    counter.increment();
                }
                None => debug!("Dropping {} byte beacon frame", frame.len()),
            }
        }
        Ok(DecodeOutput::Records(records))
    }
}
