//! Satellite pass orchestration.
//!
//! An [`Observation`] drives one pass through capture, registration and
//! decode. The [`ObservationPlanner`] is the periodic work that claims
//! upcoming windows from the pass predictor and runs each observation on a
//! dedicated lane task.

mod capture;
mod orchestrator;
mod planner;
mod types;

pub use capture::{allocate_raw_file, capture_commands, has_capture};
pub use orchestrator::{Observation, ObservationContext};
pub use planner::ObservationPlanner;
pub use types::{ObservationId, ObservationState};
