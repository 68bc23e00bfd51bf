//! Periodic background sweep.
//!
//! Stores that bound their memory by expiry implement [`Sweep`]; a
//! [`Sweeper`] owns the tokio task that calls it on a fixed interval.
//! Dropping the handle stops the task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// A store that can purge expired state.
pub trait Sweep: Send + Sync + 'static {
    /// Remove expired state, returning how many entries were dropped.
    fn sweep(&self) -> usize;
}

/// Handle to a running sweep task.
#[derive(Debug)]
pub struct Sweeper {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn a task calling `target.sweep()` every `interval`.
    ///
    /// The first sweep runs one full interval after spawning.
    pub fn spawn<S>(name: &'static str, target: Arc<S>, interval: Duration) -> Self
    where
        S: Sweep + ?Sized,
    {
        let (shutdown, mut stop) = watch::channel(false);
        let period = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = target.sweep();
                        if removed > 0 {
                            debug!(sweeper = name, removed, "Swept expired entries");
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        info!(sweeper = name, interval_ms = period.as_millis() as u64, "Sweeper started");

        Self {
            name,
            shutdown,
            task: Some(task),
        }
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!(sweeper = self.name, "Sweeper stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
