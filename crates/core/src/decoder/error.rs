//! Error types for the decoder module.

use std::path::PathBuf;
use thiserror::Error;

use crate::satellite::DecoderMode;

/// Errors that can occur while decoding a capture.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// No variant registered for the satellite's mode.
    #[error("No decoder registered for mode {0}")]
    UnknownMode(DecoderMode),

    /// Reading the sample file failed.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sample file is not a WAV file we can read.
    #[error("Invalid WAV file {path}: {reason}")]
    InvalidWav { path: PathBuf, reason: String },

    /// The DSP toolkit failed.
    #[error("DSP failure: {0}")]
    Dsp(String),

    /// The blocking decode thread panicked or was cancelled.
    #[error("Decode task aborted: {0}")]
    Aborted(String),
}

impl DecodeError {
    pub(crate) fn invalid_wav(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidWav {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
