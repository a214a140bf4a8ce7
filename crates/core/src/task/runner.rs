//! Fault-isolating wrapper around periodic work.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::state::TaskState;
use super::store::{StateError, StateStore};
use crate::metrics::TASK_INVOCATIONS;

/// Errors raised by a unit of periodic work.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("{0}")]
    Work(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    pub fn work(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Work(err.into())
    }
}

/// A unit of work invoked on a fixed schedule.
///
/// The work receives the current [`TaskState`] and returns the next one.
/// Returning a state with `fatal` set disables the task permanently;
/// returning one with `retry_after` set pauses it until the deadline.
#[async_trait]
pub trait PeriodicWork: Send + Sync {
    /// Name used in logs, metrics and as the persisted key prefix.
    fn name(&self) -> &str;

    async fn execute(&self, state: TaskState, now: DateTime<Utc>)
        -> Result<TaskState, TaskError>;
}

/// What a single invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The work ran and returned a state.
    Completed,
    /// The work ran and failed or panicked; the fault was swallowed.
    Failed,
    /// Skipped, a backoff deadline is still pending.
    BackingOff { until: DateTime<Utc> },
    /// Skipped, the task is latched fatal.
    Disabled,
}

impl InvocationOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::BackingOff { .. } => "backing_off",
            Self::Disabled => "disabled",
        }
    }
}

/// Anything the scheduler can invoke periodically.
#[async_trait]
pub trait Invocable: Send + Sync {
    fn name(&self) -> &str;

    /// Never panics and never returns an error.
    async fn invoke(&self) -> InvocationOutcome;
}

/// Runs [`PeriodicWork`] under the resilient task contract.
///
/// Invocations are serialized; the last persisted state stays readable
/// while one is running.
pub struct ResilientTask<W: PeriodicWork> {
    work: W,
    store: Arc<dyn StateStore>,
    invocation: Mutex<()>,
    state: RwLock<TaskState>,
}

impl<W: PeriodicWork> ResilientTask<W> {
    /// Wrap `work`, restoring its state persisted under [`PeriodicWork::name`].
    pub fn new(work: W, store: Arc<dyn StateStore>) -> Result<Self, StateError> {
        let state = TaskState::load(store.as_ref(), work.name())?;
        if state.fatal {
            info!("Task {} is disabled by a previous fatal error", work.name());
        }
        Ok(Self {
            work,
            store,
            invocation: Mutex::new(()),
            state: RwLock::new(state),
        })
    }

    pub fn work(&self) -> &W {
        &self.work
    }

    /// Snapshot of the last persisted state.
    pub fn state(&self) -> TaskState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, next: TaskState) {
        match self.state.write() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Invoke the work as of `now`.
    pub async fn invoke_at(&self, now: DateTime<Utc>) -> InvocationOutcome {
        let outcome = self.invoke_inner(now).await;
        TASK_INVOCATIONS
            .with_label_values(&[self.work.name(), outcome.label()])
            .inc();
        outcome
    }

    async fn invoke_inner(&self, now: DateTime<Utc>) -> InvocationOutcome {
        let name = self.work.name();
        let _running = self.invocation.lock().await;
        let mut state = self.state();

        if state.fatal {
            return InvocationOutcome::Disabled;
        }

        if let Some(deadline) = state.retry_after {
            if deadline > now {
                debug!("Task {} backing off until {}", name, deadline);
                return InvocationOutcome::BackingOff { until: deadline };
            }
            let mut cleared = state.clone();
            cleared.retry_after = None;
            if let Err(e) = self.persist(&state, &cleared) {
                error!("Task {}: unable to clear retry deadline: {}", name, e);
                return InvocationOutcome::Failed;
            }
            self.publish(cleared.clone());
            state = cleared;
        }

        let result = AssertUnwindSafe(self.work.execute(state.clone(), now))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(next)) => {
                if next.fatal && !state.fatal {
                    error!("Task {} hit a fatal error and is now disabled", name);
                }
                let persisted = self.persist(&state, &next);
                self.publish(next);
                match persisted {
                    Ok(()) => InvocationOutcome::Completed,
                    Err(e) => {
                        error!("Task {}: unable to persist state: {}", name, e);
                        InvocationOutcome::Failed
                    }
                }
            }
            Ok(Err(e)) => {
                error!("Task {} failed: {}", name, e);
                InvocationOutcome::Failed
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Task {} panicked: {}", name, reason);
                InvocationOutcome::Failed
            }
        }
    }

    fn persist(&self, previous: &TaskState, next: &TaskState) -> Result<(), StateError> {
        let changes = next.changes_from(previous, self.work.name());
        self.store.apply(&changes)
    }
}

#[async_trait]
impl<W: PeriodicWork> Invocable for ResilientTask<W> {
    fn name(&self) -> &str {
        self.work.name()
    }

    async fn invoke(&self) -> InvocationOutcome {
        self.invoke_at(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::MemoryStateStore;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// What the scripted work does on its next call.
    #[derive(Clone, Copy)]
    enum Step {
        Succeed,
        Fail,
        Panic,
        Fatal,
        Backoff(i64),
    }

    struct ScriptedWork {
        step: std::sync::Mutex<Step>,
        calls: AtomicUsize,
    }

    impl ScriptedWork {
        fn new(step: Step) -> Self {
            Self {
                step: std::sync::Mutex::new(step),
                calls: AtomicUsize::new(0),
            }
        }

        fn set(&self, step: Step) {
            *self.step.lock().unwrap() = step;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PeriodicWork for ScriptedWork {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn execute(
            &self,
            mut state: TaskState,
            now: DateTime<Utc>,
        ) -> Result<TaskState, TaskError> {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let step = *self.step.lock().unwrap();
            match step {
                Step::Succeed => {
                    state.set_value("calls", calls.to_string());
                    Ok(state)
                }
                Step::Fail => Err(TaskError::work("upstream unavailable")),
                Step::Panic => panic!("work exploded"),
                Step::Fatal => Ok(state.into_fatal()),
                Step::Backoff(minutes) => Ok(state.backoff_until(now + Duration::minutes(minutes))),
            }
        }
    }

    fn task(step: Step, store: &Arc<MemoryStateStore>) -> ResilientTask<ScriptedWork> {
        ResilientTask::new(ScriptedWork::new(step), Arc::clone(store) as Arc<dyn StateStore>)
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_persists_state() {
        let store = Arc::new(MemoryStateStore::new());
        let task = task(Step::Succeed, &store);

        assert_eq!(task.invoke_at(Utc::now()).await, InvocationOutcome::Completed);
        assert_eq!(store.get("scripted.calls").unwrap().as_deref(), Some("1"));
    }

    /// Blocks inside `execute` until released.
    #[derive(Default)]
    struct GatedWork {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PeriodicWork for GatedWork {
        fn name(&self) -> &str {
            "gated"
        }

        async fn execute(
            &self,
            mut state: TaskState,
            _now: DateTime<Utc>,
        ) -> Result<TaskState, TaskError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            state.set_value("done", "yes");
            Ok(state)
        }
    }

    #[tokio::test]
    async fn test_state_readable_while_work_runs() {
        let store = Arc::new(MemoryStateStore::new());
        let task = Arc::new(
            ResilientTask::new(GatedWork::default(), store as Arc<dyn StateStore>).unwrap(),
        );

        let first = tokio::spawn({
            let task = Arc::clone(&task);
            async move { task.invoke_at(Utc::now()).await }
        });
        task.work().entered.notified().await;

        // Snapshot reads do not wait for the running invocation.
        assert!(task.state().value("done").is_none());

        // A second invocation queues behind the first.
        let second = tokio::spawn({
            let task = Arc::clone(&task);
            async move { task.invoke_at(Utc::now()).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(task.work().calls.load(Ordering::SeqCst), 1);

        task.work().release.notify_one();
        assert_eq!(first.await.unwrap(), InvocationOutcome::Completed);
        assert_eq!(task.state().value("done"), Some("yes"));

        task.work().entered.notified().await;
        task.work().release.notify_one();
        assert_eq!(second.await.unwrap(), InvocationOutcome::Completed);
        assert_eq!(task.work().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_is_swallowed_and_state_kept() {
        let store = Arc::new(MemoryStateStore::new());
        let task = task(Step::Succeed, &store);
        task.invoke_at(Utc::now()).await;

        task.work().set(Step::Fail);
        assert_eq!(task.invoke_at(Utc::now()).await, InvocationOutcome::Failed);
        assert_eq!(task.state().value("calls"), Some("1"));

        task.work().set(Step::Succeed);
        assert_eq!(task.invoke_at(Utc::now()).await, InvocationOutcome::Completed);
        assert_eq!(task.work().calls(), 3);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let store = Arc::new(MemoryStateStore::new());
        let task = task(Step::Panic, &store);

        assert_eq!(task.invoke_at(Utc::now()).await, InvocationOutcome::Failed);

        task.work().set(Step::Succeed);
        assert_eq!(task.invoke_at(Utc::now()).await, InvocationOutcome::Completed);
    }

    #[tokio::test]
    async fn test_fatal_is_permanent() {
        let store = Arc::new(MemoryStateStore::new());
        let task = task(Step::Fatal, &store);

        assert_eq!(task.invoke_at(Utc::now()).await, InvocationOutcome::Completed);
        assert_eq!(store.get("scripted.fatal").unwrap().as_deref(), Some("true"));

        task.work().set(Step::Succeed);
        for _ in 0..5 {
            assert_eq!(task.invoke_at(Utc::now()).await, InvocationOutcome::Disabled);
        }
        assert_eq!(task.work().calls(), 1);
        assert!(store.get("scripted.calls").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fatal_survives_restart() {
        let store = Arc::new(MemoryStateStore::new());
        task(Step::Fatal, &store).invoke_at(Utc::now()).await;

        let restarted = task(Step::Succeed, &store);
        assert_eq!(
            restarted.invoke_at(Utc::now()).await,
            InvocationOutcome::Disabled
        );
        assert_eq!(restarted.work().calls(), 0);
    }

    #[tokio::test]
    async fn test_backoff_window() {
        let store = Arc::new(MemoryStateStore::new());
        let task = task(Step::Backoff(30), &store);
        let t0 = Utc::now();

        assert_eq!(task.invoke_at(t0).await, InvocationOutcome::Completed);
        let deadline = t0 + Duration::minutes(30);
        assert_eq!(task.state().retry_after, Some(deadline));
        assert!(store.get("scripted.retry.after.millis").unwrap().is_some());

        task.work().set(Step::Succeed);
        assert_eq!(
            task.invoke_at(t0 + Duration::minutes(10)).await,
            InvocationOutcome::BackingOff { until: deadline }
        );
        assert_eq!(task.work().calls(), 1);

        assert_eq!(
            task.invoke_at(t0 + Duration::minutes(31)).await,
            InvocationOutcome::Completed
        );
        assert_eq!(task.work().calls(), 2);
        assert!(task.state().retry_after.is_none());
        assert!(store.get("scripted.retry.after.millis").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_deadline_cleared_even_if_work_fails() {
        let store = Arc::new(MemoryStateStore::new());
        let task = task(Step::Backoff(30), &store);
        let t0 = Utc::now();
        task.invoke_at(t0).await;

        task.work().set(Step::Fail);
        assert_eq!(
            task.invoke_at(t0 + Duration::minutes(31)).await,
            InvocationOutcome::Failed
        );
        assert!(store.get("scripted.retry.after.millis").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backoff_survives_restart() {
        let store = Arc::new(MemoryStateStore::new());
        let t0 = Utc::now();
        task(Step::Backoff(30), &store).invoke_at(t0).await;

        let restarted = task(Step::Succeed, &store);
        assert!(matches!(
            restarted.invoke_at(t0 + Duration::minutes(5)).await,
            InvocationOutcome::BackingOff { .. }
        ));
        assert_eq!(restarted.work().calls(), 0);
    }
}
