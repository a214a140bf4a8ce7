//! Types for the observation module.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::satellite::PassWindow;

/// Identity of an observation: the pass start in Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationId(String);

impl ObservationId {
    pub fn from_window(window: &PassWindow) -> Self {
        Self(window.start.timestamp_millis().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationState {
    Created,
    Capturing,
    Captured,
    Decoded,
    Failed,
}

impl ObservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Capturing => "capturing",
            Self::Captured => "captured",
            Self::Decoded => "decoded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Decoded | Self::Failed)
    }
}

impl fmt::Display for ObservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_id_is_start_millis() {
        let start = Utc.with_ymd_and_hms(2019, 6, 8, 12, 30, 0).unwrap();
        let window = PassWindow::new(start, start + chrono::Duration::minutes(12));
        let id = ObservationId::from_window(&window);
        assert_eq!(id.as_str(), "1559997000000");
        assert_eq!(id, ObservationId::from_window(&window));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ObservationState::Decoded.is_terminal());
        assert!(ObservationState::Failed.is_terminal());
        assert!(!ObservationState::Captured.is_terminal());
        assert_eq!(ObservationState::Capturing.to_string(), "capturing");
    }
}
