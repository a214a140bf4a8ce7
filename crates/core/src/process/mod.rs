//! Chains of external processes.
//!
//! A [`ProcessPipe`] owns the children it spawns. Bytes flow from each
//! stage's stdout into the next stage's stdin through an in-process copy
//! loop, so a cooperative [`StopHandle`] can interrupt the flow at any
//! chunk boundary. Teardown asks every child to terminate, waits a bounded
//! time, then kills.

mod error;
mod pipe;
mod types;

pub use error::ProcessError;
pub use pipe::{shutdown_pipe, PipeEnd, PipeReport, ProcessPipe, PIPE_BUFFER_SIZE};
pub use types::{CommandSpec, OutputPolicy, StopHandle, StopSignal};
