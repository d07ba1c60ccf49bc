//! Background loop supervisor.
//!
//! Each registered task runs on its own timer. A tick that errors or panics
//! is recorded on the task's descriptor and the loop carries on. On shutdown
//! every loop observes the token at its next await point; the supervisor
//! waits up to the grace period and abandons whatever is still running.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::shutdown::Shutdown;
use crate::task::{BackgroundTask, TaskDescriptor, TaskOutcome};

type Descriptors = Arc<RwLock<BTreeMap<String, TaskDescriptor>>>;

/// Outcome of [`Supervisor::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Tasks that exited within the grace period.
    pub completed: Vec<String>,
    /// Tasks still running when the grace period expired.
    pub abandoned: Vec<String>,
}

pub struct Supervisor {
    shutdown: Shutdown,
    grace_period: Duration,
    tasks: Mutex<Vec<Arc<dyn BackgroundTask>>>,
    descriptors: Descriptors,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Supervisor {
    pub fn new(shutdown: Shutdown, grace_period: Duration) -> Self {
        Self {
            shutdown,
            grace_period,
            tasks: Mutex::new(Vec::new()),
            descriptors: Arc::new(RwLock::new(BTreeMap::new())),
            handles: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Register a task. Tasks registered after [`start`](Self::start) are spawned immediately.
    pub fn register(&self, task: Arc<dyn BackgroundTask>) {
        let name = task.name().to_string();
        self.descriptors
            .write()
            .insert(name.clone(), TaskDescriptor::new(&name, task.interval()));
        info!(task = %name, interval = ?task.interval(), "Background task registered");

        if self.started.load(Ordering::SeqCst) {
            self.spawn(task);
        } else {
            self.tasks.lock().push(task);
        }
    }

    /// Spawn every registered loop. Calling it twice has no effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let tasks = std::mem::take(&mut *self.tasks.lock());
        info!(tasks = tasks.len(), "Starting background loops");
        for task in tasks {
            self.spawn(task);
        }
    }

    /// Snapshot of all task descriptors, ordered by name.
    pub fn descriptors(&self) -> Vec<TaskDescriptor> {
        self.descriptors.read().values().cloned().collect()
    }

    pub fn descriptor(&self, name: &str) -> Option<TaskDescriptor> {
        self.descriptors.read().get(name).cloned()
    }

    /// Number of loops that have not exited yet.
    pub fn running(&self) -> usize {
        self.handles
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Trigger the shared shutdown signal and wait for all loops, up to the
    /// grace period. Later calls return an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return ShutdownReport::default();
        }
        self.shutdown.trigger("supervisor shutdown");

        let handles = std::mem::take(&mut *self.handles.lock());
        let deadline = Instant::now() + self.grace_period;
        // A tick that blocks its worker thread can stall the runtime timer, so
        // the grace period is also enforced by a plain OS thread.
        let wall_clock = wall_clock_expiry(self.grace_period).fuse();
        tokio::pin!(wall_clock);
        let mut expired = false;
        let mut report = ShutdownReport::default();

        for (name, mut handle) in handles {
            let joined = if expired {
                None
            } else {
                tokio::select! {
                    biased;
                    result = &mut handle => Some(result),
                    _ = tokio::time::sleep_until(deadline) => None,
                    _ = &mut wall_clock => None,
                }
            };

            match joined {
                Some(Ok(())) => report.completed.push(name),
                Some(Err(e)) => {
                    error!(task = %name, error = %e, "Background loop exited abnormally");
                    report.completed.push(name);
                }
                None => {
                    expired = true;
                    if handle.is_finished() {
                        report.completed.push(name);
                    } else {
                        warn!(task = %name, "Background loop did not stop within grace period, abandoning");
                        handle.abort();
                        report.abandoned.push(name);
                    }
                }
            }
        }

        info!(
            completed = report.completed.len(),
            abandoned = report.abandoned.len(),
            "Background loops stopped"
        );
        report
    }

    fn spawn(&self, task: Arc<dyn BackgroundTask>) {
        let name = task.name().to_string();
        let handle = tokio::spawn(run_loop(
            task,
            self.shutdown.token(),
            self.descriptors.clone(),
        ));
        self.handles.lock().push((name, handle));
    }
}

async fn run_loop(task: Arc<dyn BackgroundTask>, token: CancellationToken, descriptors: Descriptors) {
    let name = task.name().to_string();
    let period = task.interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(task = %name, "Background loop started");
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started_at = Utc::now();
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(task = %name, "In-flight tick dropped for shutdown");
                break;
            }
            result = AssertUnwindSafe(task.tick()).catch_unwind() => result,
        };

        let outcome = match result {
            Ok(Ok(())) => TaskOutcome::Ok,
            Ok(Err(e)) => {
                warn!(task = %name, error = %e, "Background tick failed");
                TaskOutcome::Error(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(task = %name, panic = %message, "Background tick panicked");
                TaskOutcome::Panicked(message)
            }
        };

        if let Some(descriptor) = descriptors.write().get_mut(&name) {
            descriptor.record(started_at, outcome);
        }
    }
    debug!(task = %name, "Background loop stopped");
}

/// Completes once `grace` has elapsed on the wall clock, independent of the
/// runtime's timer.
async fn wall_clock_expiry(grace: Duration) {
    let (tx, rx) = oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name("supervisor-grace".to_string())
        .spawn(move || {
            std::thread::sleep(grace);
            let _ = tx.send(());
        });
    match spawned {
        Ok(_) => {
            let _ = rx.await;
        }
        Err(e) => {
            warn!(error = %e, "Grace timer thread unavailable, relying on runtime timer");
            futures::future::pending::<()>().await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
