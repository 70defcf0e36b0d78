//! Single-lane async task queue.
//!
//! Tasks run one at a time in the order they were enqueued. Between two tasks
//! the runner waits `delay`, but only when something is still queued. The
//! runner task exits when the queue drains and is respawned by the next
//! `enqueue`.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::QueueError;

/// Default pause between consecutive tasks.
pub const DEFAULT_TASK_DELAY: Duration = Duration::from_millis(500);

type BoxTask = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default)]
struct State {
    tasks: VecDeque<BoxTask>,
    running: bool,
}

struct Inner {
    state: Mutex<State>,
    delay: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A task never runs while the lock is held, so a poisoned guard still
        // holds a consistent queue.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Serial request queue. Cloning shares the same lane.
#[derive(Clone)]
pub struct SerialQueue {
    inner: Arc<Inner>,
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TASK_DELAY)
    }
}

impl SerialQueue {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                delay,
            }),
        }
    }

    /// Queue `task` and return a future for its result.
    ///
    /// The task is placed in line immediately, before the returned future is
    /// polled. If the task panics, or is dropped because the runtime shut
    /// down, the caller gets `QueueError::TaskAborted` converted into `E`.
    /// Must be called from within a Tokio runtime.
    pub fn enqueue<F, Fut, T, E>(&self, task: F) -> impl Future<Output = Result<T, E>> + Send
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<QueueError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: BoxTask = Box::pin(async move {
            let outcome = AssertUnwindSafe(async move { task().await })
                .catch_unwind()
                .await;
            if outcome.is_err() {
                warn!("Queued task panicked");
            }
            // Receiver gone means the caller stopped waiting.
            let _ = tx.send(outcome.ok());
        });

        let spawn_runner = {
            let mut state = self.inner.lock();
            state.tasks.push_back(job);
            !std::mem::replace(&mut state.running, true)
        };

        if spawn_runner {
            debug!("Starting serial queue runner");
            tokio::spawn(run(self.inner.clone()));
        }

        async move {
            match rx.await {
                Ok(Some(result)) => result,
                Ok(None) | Err(_) => Err(E::from(QueueError::TaskAborted)),
            }
        }
    }

    /// Tasks waiting to start.
    pub fn pending(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// True while the runner is alive (a task is running or queued).
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }
}

async fn run(inner: Arc<Inner>) {
    loop {
        let next = {
            let mut state = inner.lock();
            match state.tasks.pop_front() {
                Some(task) => task,
                None => {
                    state.running = false;
                    debug!("Serial queue drained, runner exiting");
                    return;
                }
            }
        };

        next.await;

        let more = !inner.lock().tasks.is_empty();
        if more {
            tokio::time::sleep(inner.delay).await;
        }
    }
}
