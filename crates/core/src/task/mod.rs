//! Resilient periodic tasks.
//!
//! Every background job (the observation planner, the DNS updater) runs
//! under the same contract:
//! - a fault in one invocation is logged and swallowed, never reaching the
//!   scheduler loop
//! - a fatal outcome disables the task permanently
//! - a transient outcome sets a backoff deadline that survives restarts
//!
//! State is explicit: each invocation receives a [`TaskState`] and returns
//! the next one, and the runner persists the difference through a
//! [`StateStore`] before the invocation returns.

mod runner;
mod scheduler;
mod state;
mod store;

pub use runner::{InvocationOutcome, Invocable, PeriodicWork, ResilientTask, TaskError};
pub use scheduler::Scheduler;
pub use state::TaskState;
pub use store::{MemoryStateStore, SqliteStateStore, StateChange, StateError, StateStore};
