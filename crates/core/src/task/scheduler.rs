//! Fixed-period scheduler for resilient tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::runner::Invocable;

/// How long `shutdown` waits for each loop before aborting it.
const LOOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs every registered task on its own loop until shutdown.
pub struct Scheduler {
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
    join_timeout: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            running: Arc::new(AtomicBool::new(true)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            join_timeout: LOOP_JOIN_TIMEOUT,
        }
    }

    /// Override how long `shutdown` waits for a loop mid-invocation.
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Spawn a loop invoking `task` every `period`, starting immediately.
    pub async fn spawn_periodic(&self, task: Arc<dyn Invocable>, period: Duration) {
        if !self.running.load(Ordering::SeqCst) {
            warn!("Scheduler stopped, not scheduling {}", task.name());
            return;
        }

        let name = task.name().to_string();
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let loop_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Task loop {} started (every {:?})", loop_name, period);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Task loop {} received shutdown signal", loop_name);
                        break;
                    }
                    _ = ticker.tick() => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        let outcome = task.invoke().await;
                        debug!("Task {} invocation: {:?}", loop_name, outcome);
                    }
                }
            }
            info!("Task loop {} stopped", loop_name);
        });

        self.handles.lock().await.push((name, handle));
    }

    /// Signal every loop to stop and wait for them. A loop still inside an
    /// invocation after the join timeout is aborted.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());

        let handles = std::mem::take(&mut *self.handles.lock().await);
        for (name, mut handle) in handles {
            if tokio::time::timeout(self.join_timeout, &mut handle)
                .await
                .is_err()
            {
                warn!(
                    "Task loop {} did not stop within {:?}, aborting",
                    name, self.join_timeout
                );
                handle.abort();
                let _ = handle.await;
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}
