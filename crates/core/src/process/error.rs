//! Error types for the process module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while setting up a process pipe.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Binary not found.
    #[error("Program not found: {path}")]
    NotFound { path: PathBuf },

    /// Spawning failed for another reason.
    #[error("Failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A pipe needs at least one command.
    #[error("Process pipe has no stages")]
    NoStages,
}

impl ProcessError {
    pub(crate) fn spawn(path: PathBuf, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Spawn { path, source }
        }
    }
}
