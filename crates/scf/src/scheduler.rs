// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [C8] Background Scheduler — named periodic tasks with cooperative
//! cancellation, per-task exception isolation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub type TaskHandler = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Task {
    name: String,
    interval: Duration,
    jitter: Option<Duration>,
    handler: TaskHandler,
}

/// Runs a fixed set of named periodic tasks, each isolated: one task's
/// panic or repeated failure never stops the others, and shutdown gives
/// every in-flight run up to 5s to finish before it is force-stopped
/// (recorded, not fatal).
pub struct Scheduler {
    tasks: Vec<Task>,
    cancel: CancellationToken,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self { tasks: Vec::new(), cancel: CancellationToken::new() }
    }

    pub fn register(&mut self, name: impl Into<String>, interval: Duration, jitter: Option<Duration>, handler: TaskHandler) {
        self.tasks.push(Task { name: name.into(), interval, jitter, handler });
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn every registered task on its own interval loop, returning the
    /// join handles so callers can await clean shutdown.
    pub fn spawn_all(&self) -> Vec<JoinHandle<()>> {
        self.tasks
            .iter()
            .map(|task| {
                let name = task.name.clone();
                let interval = task.interval;
                let jitter = task.jitter;
                let handler = Arc::clone(&task.handler);
                let cancel = self.cancel.clone();
                tokio::spawn(run_task_loop(name, interval, jitter, handler, cancel))
            })
            .collect()
    }

    /// Signal cancellation and wait (up to the 5s grace period) for every
    /// task to stop. Tasks still running past the grace period are
    /// force-stopped by dropping their join handle — logged, not fatal.
    pub async fn shutdown(&self, handles: Vec<JoinHandle<()>>) {
        self.cancel.cancel();
        for (idx, handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(task_index = idx, error = %e, "scheduler task panicked"),
                Err(_) => warn!(task_index = idx, "scheduler task force-stopped past shutdown grace period"),
            }
        }
    }
}

async fn run_task_loop(name: String, interval: Duration, jitter: Option<Duration>, handler: TaskHandler, cancel: CancellationToken) {
    loop {
        let sleep_for = jittered(interval, jitter);
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(task_name = %name, "scheduler task stopping on shutdown signal");
                return;
            }
            _ = tokio::time::sleep(sleep_for) => {}
        }

        let span = tracing::info_span!("scheduled_task", task_name = %name);
        let _enter = span.enter();
        // Isolate this run: a panicking handler must not take down the
        // scheduler or sibling tasks.
        let result = std::panic::AssertUnwindSafe(handler()).catch_unwind().await;
        if let Err(panic) = result {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_owned());
            error!(task_name = %name, panic = %message, "scheduled task panicked");
        }
    }
}

fn jittered(interval: Duration, jitter: Option<Duration>) -> Duration {
    match jitter {
        Some(j) if j.as_millis() > 0 => {
            let extra_ms = rand::rng().random_range(0..=j.as_millis() as u64);
            interval + Duration::from_millis(extra_ms)
        }
        _ => interval,
    }
}
