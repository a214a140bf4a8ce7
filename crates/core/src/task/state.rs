//! Explicit, persisted state of a resilient task.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};

use super::store::{StateChange, StateError, StateStore};

const FATAL_KEY: &str = "fatal";
const RETRY_AFTER_KEY: &str = "retry.after.millis";

/// State carried from one invocation of a task to the next.
///
/// `fatal` is a one-way latch. `retry_after` holds a backoff deadline;
/// `values` carries whatever the work itself needs to remember (for the
/// DNS updater, the last published IP).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskState {
    pub fatal: bool,
    pub retry_after: Option<DateTime<Utc>>,
    values: BTreeMap<String, String>,
}

impl TaskState {
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove_value(&mut self, key: &str) {
        self.values.remove(key);
    }

    /// Latch the task as permanently disabled.
    pub fn into_fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    /// Skip work until `deadline`.
    pub fn backoff_until(mut self, deadline: DateTime<Utc>) -> Self {
        self.retry_after = Some(deadline);
        self
    }

    pub fn is_backing_off(&self, now: DateTime<Utc>) -> bool {
        self.retry_after.is_some_and(|deadline| deadline > now)
    }

    /// Read the state persisted under `prefix`.
    pub fn load(store: &dyn StateStore, prefix: &str) -> Result<Self, StateError> {
        let mut state = Self::default();
        let key_prefix = format!("{}.", prefix);

        for (key, value) in store.entries_with_prefix(&key_prefix)? {
            let Some(name) = key.strip_prefix(&key_prefix) else {
                continue;
            };
            match name {
                FATAL_KEY => state.fatal = value == "true",
                RETRY_AFTER_KEY => {
                    let millis: i64 = value.parse().map_err(|_| StateError::Corrupt {
                        key: key.clone(),
                        value: value.clone(),
                    })?;
                    state.retry_after = Utc.timestamp_millis_opt(millis).single();
                }
                _ => {
                    state.values.insert(name.to_string(), value);
                }
            }
        }

        Ok(state)
    }

    /// Changes needed to move the persisted state from `previous` to `self`.
    pub(crate) fn changes_from(&self, previous: &TaskState, prefix: &str) -> Vec<StateChange> {
        let key = |name: &str| format!("{}.{}", prefix, name);
        let mut changes = Vec::new();

        if self.fatal != previous.fatal {
            changes.push(if self.fatal {
                StateChange::Set(key(FATAL_KEY), "true".to_string())
            } else {
                StateChange::Remove(key(FATAL_KEY))
            });
        }

        if self.retry_after != previous.retry_after {
            changes.push(match self.retry_after {
                Some(deadline) => StateChange::Set(
                    key(RETRY_AFTER_KEY),
                    deadline.timestamp_millis().to_string(),
                ),
                None => StateChange::Remove(key(RETRY_AFTER_KEY)),
            });
        }

        for (name, value) in &self.values {
            if previous.values.get(name) != Some(value) {
                changes.push(StateChange::Set(key(name), value.clone()));
            }
        }
        for name in previous.values.keys() {
            if !self.values.contains_key(name) {
                changes.push(StateChange::Remove(key(name)));
            }
        }

        changes
    }
}
