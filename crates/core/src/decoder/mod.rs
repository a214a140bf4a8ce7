//! Decoding captured passes.
//!
//! [`SamplePipelineAdapter`] is the entry point: it resolves the
//! [`DecoderVariant`] for a satellite's mode through the
//! [`DecoderRegistry`], opens the capture as a [`WavSource`] and drains the
//! chain the variant asks the [`Dsp`] toolkit for.
//!
//! # Example
//!
//! ```ignore
//! use groundstation_core::decoder::{CommandDsp, DecoderRegistry, SamplePipelineAdapter};
//!
//! let adapter = SamplePipelineAdapter::new(
//!     Arc::new(DecoderRegistry::with_defaults()),
//!     Arc::new(CommandDsp::new(config.dsp.clone())),
//! );
//! if let Some(result) = adapter.decode(&raw_path, &satellite).await {
//!     println!("{} records", result.decoded_records);
//! }
//! ```

mod adapter;
mod command_dsp;
mod dsp;
mod error;
mod registry;
mod source;
mod types;
mod variants;

pub use adapter::SamplePipelineAdapter;
pub use command_dsp::CommandDsp;
pub use dsp::{BpskChain, ChainSpec, Dsp, FrameStream, LrptChain};
pub use error::DecodeError;
pub use registry::DecoderRegistry;
pub use source::{WavFormat, WavSource};
pub use types::{DecodeOutput, DecodeResult, DecodedRecord, OutputKind, RecordCounter};
pub use variants::{BeaconDecoder, DecoderVariant, LrptDecoder};
