//! Bounded dispatcher for connection-establishment work.
//!
//! At most `max_concurrent` operations run at once. The rest wait in a FIFO
//! queue and are promoted one-for-one as running operations finish. Every
//! operation ends exactly once: with its own result, or with
//! [`ClientError::Cancelled`] if [`Canceller::cancel`] wins the race.

use crate::domain::config::DispatcherConfig;
use crate::domain::error::{ClientError, ClientResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, trace};

struct Job {
    id: u64,
    task: BoxFuture<'static, ()>,
}

struct QueueState {
    running: usize,
    ready: VecDeque<Job>,
}

struct Shared {
    max_concurrent: usize,
    next_id: AtomicU64,
    state: Mutex<QueueState>,
}

impl Shared {
    /// Start `job` now or queue it, depending on capacity.
    fn submit(self: &Arc<Self>, job: Job) {
        let start = {
            let mut state = self.state.lock();
            if state.running < self.max_concurrent {
                state.running += 1;
                Some(job)
            } else {
                trace!(job = job.id, queued = state.ready.len() + 1, "Dispatcher full, queueing");
                state.ready.push_back(job);
                None
            }
        };
        if let Some(job) = start {
            self.spawn(job);
        }
    }

    fn spawn(self: &Arc<Self>, job: Job) {
        let shared = Arc::clone(self);
        let id = job.id;
        tokio::spawn(async move {
            job.task.await;
            trace!(job = id, "Dispatched operation finished");
            shared.finished();
        });
    }

    fn finished(self: &Arc<Self>) {
        let next = {
            let mut state = self.state.lock();
            match state.ready.pop_front() {
                Some(job) => Some(job),
                None => {
                    state.running = state.running.saturating_sub(1);
                    None
                }
            }
        };
        if let Some(job) = next {
            self.spawn(job);
        }
    }

    /// Drop a job that has not started yet. Returns true if it was queued.
    fn remove_queued(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        match state.ready.iter().position(|job| job.id == id) {
            Some(pos) => {
                state.ready.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Bounded FIFO worker pool for connection establishment.
#[derive(Clone)]
pub struct CallDispatcher {
    shared: Arc<Shared>,
}

impl CallDispatcher {
    pub fn new(config: &DispatcherConfig) -> Self {
        Self::with_max_concurrent(config.max_concurrent)
    }

    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                max_concurrent: max_concurrent.max(1),
                next_id: AtomicU64::new(1),
                state: Mutex::new(QueueState {
                    running: 0,
                    ready: VecDeque::new(),
                }),
            }),
        }
    }

    /// Schedule `operation`. Must be called from within a tokio runtime.
    pub fn enqueue<F, T>(&self, operation: F) -> DispatchHandle<T>
    where
        F: Future<Output = ClientResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (result_tx, result_rx) = oneshot::channel();
        let completer: Arc<Mutex<Option<oneshot::Sender<ClientResult<T>>>>> =
            Arc::new(Mutex::new(Some(result_tx)));
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let job_completer = Arc::clone(&completer);
        let task = async move {
            tokio::select! {
                result = operation => {
                    if let Some(tx) = job_completer.lock().take() {
                        let _ = tx.send(result);
                    }
                }
                Ok(()) = async { cancel_rx.wait_for(|cancelled| *cancelled).await.map(|_| ()) } => {
                    debug!(job = id, "Running operation interrupted");
                }
            }
        }
        .boxed();

        let cancel_completer = Arc::clone(&completer);
        let canceller = Canceller {
            id,
            shared: Arc::clone(&self.shared),
            signal: Arc::new(cancel_tx),
            complete: Arc::new(move || {
                cancel_completer
                    .lock()
                    .take()
                    .map(|tx| {
                        let _ = tx.send(Err(ClientError::Cancelled));
                    })
                    .is_some()
            }),
        };

        self.shared.submit(Job { id, task });

        DispatchHandle {
            result: result_rx,
            canceller,
        }
    }

    /// Operations currently executing
    pub fn running_count(&self) -> usize {
        self.shared.state.lock().running
    }

    /// Operations waiting for a free slot
    pub fn queued_count(&self) -> usize {
        self.shared.state.lock().ready.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.shared.max_concurrent
    }
}

impl Default for CallDispatcher {
    fn default() -> Self {
        Self::new(&DispatcherConfig::default())
    }
}

impl std::fmt::Debug for CallDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallDispatcher")
            .field("max_concurrent", &self.shared.max_concurrent)
            .field("running", &self.running_count())
            .field("queued", &self.queued_count())
            .finish()
    }
}

/// Cancels one dispatched operation. Cloneable and idempotent.
#[derive(Clone)]
pub struct Canceller {
    id: u64,
    shared: Arc<Shared>,
    signal: Arc<watch::Sender<bool>>,
    complete: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl Canceller {
    /// Cancel the operation. Returns true if this call decided the outcome;
    /// false if the operation had already finished or been cancelled.
    pub fn cancel(&self) -> bool {
        if !(self.complete)() {
            return false;
        }
        if self.shared.remove_queued(self.id) {
            debug!(job = self.id, "Queued operation cancelled");
        } else {
            let _ = self.signal.send(true);
        }
        true
    }
}

/// Result side of a dispatched operation.
pub struct DispatchHandle<T> {
    result: oneshot::Receiver<ClientResult<T>>,
    canceller: Canceller,
}

impl<T> DispatchHandle<T> {
    /// Wait for the single outcome.
    pub async fn wait(self) -> ClientResult<T> {
        self.result.await.unwrap_or(Err(ClientError::Cancelled))
    }

    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    /// Detached canceller, for use after the handle moves into a waiter.
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }
}
