//! Types for the decoder module.

use serde::{Deserialize, Serialize};

/// What a decoder variant produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// A single rendered image.
    Image,
    /// A sequence of telemetry records.
    Records,
}

impl OutputKind {
    /// Result store channel tag for this output.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Image => "a",
            Self::Records => "data",
        }
    }

    /// File extension of the persisted artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Records => "json",
        }
    }
}

/// One telemetry frame recovered from a beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedRecord {
    /// Position of the frame in the pass, starting at 0.
    pub sequence: u64,
    /// Spacecraft id from the frame header.
    pub satellite_id: u8,
    /// Frame type from the frame header.
    pub frame_type: u8,
    /// Frame body after the header.
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
}

/// Decoded artifact of one pass.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutput {
    /// Encoded image, or `None` when no frame synchronized.
    Image(Option<Vec<u8>>),
    Records(Vec<DecodedRecord>),
}

impl DecodeOutput {
    pub fn kind(&self) -> OutputKind {
        match self {
            Self::Image(_) => OutputKind::Image,
            Self::Records(_) => OutputKind::Records,
        }
    }

    /// Whether there is anything worth persisting as an artifact.
    pub fn has_artifact(&self) -> bool {
        match self {
            Self::Image(image) => image.is_some(),
            Self::Records(records) => !records.is_empty(),
        }
    }
}

/// Result of decoding one raw capture.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    pub output: DecodeOutput,
    /// Records counted during this decode call only.
    pub decoded_records: u64,
}

impl DecodeResult {
    /// Bytes of the artifact to persist, if any.
    pub fn artifact_bytes(&self) -> Result<Option<Vec<u8>>, serde_json::Error> {
        match &self.output {
            DecodeOutput::Image(image) => Ok(image.clone()),
            DecodeOutput::Records(records) if records.is_empty() => Ok(None),
            DecodeOutput::Records(records) => serde_json::to_vec_pretty(records).map(Some),
        }
    }
}

/// Counts records decoded within a single decode call.
///
/// A fresh counter is created per call, so concurrent decodes of the same
/// mode never see each other's counts.
#[derive(Debug, Default)]
pub struct RecordCounter {
    count: u64,
}

impl RecordCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self) {
        self.count += 1;
    }

    pub fn add(&mut self, n: u64) {
        self.count += n;
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
