// src/tasks.rs
//
// Start/stop handle for the long-lived background loops. The supervisor in
// main owns one of these per loop.

use std::future::Future;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Stopping,
}

struct Inner {
    state: TaskState,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

pub struct ManagedTask {
    name: String,
    inner: Mutex<Inner>,
}

impl ManagedTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Mutex::new(Inner {
                state: TaskState::Idle,
                cancel: None,
                handle: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawns the loop built by `make`. No-op (returns false) unless idle.
    pub async fn start<F, Fut>(&self, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock().await;
        if inner.state != TaskState::Idle {
            info!("{} is already running", self.name);
            return false;
        }

        info!("Starting {}", self.name);
        let cancel = CancellationToken::new();
        inner.handle = Some(tokio::spawn(make(cancel.clone())));
        inner.cancel = Some(cancel);
        inner.state = TaskState::Running;
        true
    }

    /// Cancels the loop and waits for it to unwind. Returns false when
    /// there was nothing to stop.
    pub async fn stop(&self) -> bool {
        // Held across the join so a concurrent stop observes Idle.
        let mut inner = self.inner.lock().await;
        if inner.state == TaskState::Idle {
            return false;
        }

        inner.state = TaskState::Stopping;
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = inner.handle.take() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("{} panicked: {}", self.name, e);
                }
            }
        }
        inner.state = TaskState::Idle;
        info!("{} was successfully cancelled", self.name);
        true
    }

    /// A loop that returned on its own reports `Idle`.
    pub async fn state(&self) -> TaskState {
        let inner = self.inner.lock().await;
        match (&inner.state, &inner.handle) {
            (TaskState::Running, Some(handle)) if handle.is_finished() => TaskState::Idle,
            (state, _) => *state,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == TaskState::Running
    }
}
