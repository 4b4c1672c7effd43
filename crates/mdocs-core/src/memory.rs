//! Registry of named cleanup tasks.
//!
//! Components that hold reclaimable memory register a callback here; the
//! owner runs them on demand or on a timer.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

type CleanupTask = Arc<dyn Fn() + Send + Sync>;

/// Named cleanup callbacks, run in registration order.
#[derive(Default)]
pub struct MemoryManager {
    tasks: Mutex<Vec<(String, CleanupTask)>>,
}

impl fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryManager")
            .field("tasks", &self.task_names())
            .finish()
    }
}

impl MemoryManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` under `name`, replacing any task with the same name.
    pub fn register<F>(&self, name: impl Into<String>, task: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let task: CleanupTask = Arc::new(task);
        if let Some(slot) = tasks.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = task;
        } else {
            tasks.push((name, task));
        }
    }

    /// Remove the task named `name`. Returns whether it existed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = tasks.len();
        tasks.retain(|(n, _)| n != name);
        tasks.len() != before
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Run every task once and return how many completed.
    ///
    /// A panicking task is logged and skipped.
    pub fn run_cleanup(&self) -> usize {
        // Snapshot so tasks may register or unregister while running.
        let tasks: Vec<(String, CleanupTask)> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut completed = 0;
        for (name, task) in &tasks {
            match std::panic::catch_unwind(AssertUnwindSafe(|| task())) {
                Ok(()) => completed += 1,
                Err(_) => warn!("Cleanup task '{name}' panicked"),
            }
        }
        debug!("Ran {completed}/{} cleanup tasks", tasks.len());
        completed
    }

    /// Run cleanup every `period` on the current tokio runtime.
    ///
    /// The timer stops when the returned handle is dropped.
    pub fn spawn_periodic(self: &Arc<Self>, period: Duration) -> CleanupHandle {
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut timer = interval(period);
            // The first tick completes immediately.
            timer.tick().await;
            loop {
                timer.tick().await;
                manager.run_cleanup();
            }
        });
        CleanupHandle { task }
    }
}

/// Aborts the periodic cleanup task on drop.
#[derive(Debug)]
pub struct CleanupHandle {
    task: JoinHandle<()>,
}

impl CleanupHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
