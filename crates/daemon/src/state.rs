use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use groundstation_core::{NoIpTask, ObservationPlanner, PeriodicWork, ResilientTask};

/// Persisted state of one resilient task, as shown on `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub name: String,
    pub fatal: bool,
    pub retry_after: Option<DateTime<Utc>>,
}

/// Shared application state
pub struct AppState {
    planner: Arc<ResilientTask<ObservationPlanner>>,
    ddns: Option<Arc<ResilientTask<NoIpTask>>>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        planner: Arc<ResilientTask<ObservationPlanner>>,
        ddns: Option<Arc<ResilientTask<NoIpTask>>>,
    ) -> Self {
        Self {
            planner,
            ddns,
            started_at: Utc::now(),
        }
    }

    pub fn planner(&self) -> &ResilientTask<ObservationPlanner> {
        &self.planner
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn task_statuses(&self) -> Vec<TaskStatus> {
        let mut statuses = vec![status_of(&self.planner)];
        if let Some(ddns) = &self.ddns {
            statuses.push(status_of(ddns));
        }
        statuses
    }
}

fn status_of<W: PeriodicWork>(task: &ResilientTask<W>) -> TaskStatus {
    let state = task.state();
    TaskStatus {
        name: task.work().name().to_string(),
        fatal: state.fatal,
        retry_after: state.retry_after,
    }
}
