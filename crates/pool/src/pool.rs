//! Fixed-size worker pool over a bounded FIFO queue.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::error::{PoolError, TaskError};
use crate::handle::{outcome_slot, TaskHandle};
use crate::telemetry::{PoolTelemetry, TracingTelemetry};

/// Queue capacity used when no bound is configured.
const UNBOUNDED_QUEUE_CAPACITY: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// How a queued job ended, as seen by the worker that ran it.
enum JobStatus {
    Completed,
    Panicked(String),
}

type Job = BoxFuture<'static, JobStatus>;

/// State shared between the pool and its workers.
struct PoolShared {
    name: String,
    active: AtomicUsize,
    telemetry: Arc<dyn PoolTelemetry>,
}

/// Bounded-concurrency task executor.
///
/// A fixed set of workers pulls tasks from a FIFO queue. At most `workers`
/// tasks run at any moment. When the queue holds `max_queue_depth` tasks,
/// [`submit`](Self::submit) waits until a worker frees a slot.
///
/// Every accepted task runs to completion before [`shutdown`](Self::shutdown)
/// returns. A panic inside a task is captured into that task's handle and never
/// takes down a worker.
///
/// Pools may be created from inside a task running on another pool; the inner
/// pool's workers are independent tasks on the same runtime.
pub struct WorkerPool {
    config: PoolConfig,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
    shared: Arc<PoolShared>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("active_workers", &self.active_workers())
            .field("queue_depth", &self.queue_depth())
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool and start its workers, logging task events via `tracing`.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a bad configuration, or `NoRuntime` when
    /// called outside of a Tokio runtime.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_telemetry(config, Arc::new(TracingTelemetry))
    }

    /// Create a pool with a custom telemetry observer.
    ///
    /// # Arguments
    /// * `config` - Worker count, queue bound and name
    /// * `telemetry` - Receives task start/finish/failure events
    ///
    /// # Errors
    /// Same as [`new`](Self::new).
    pub fn with_telemetry(
        config: PoolConfig,
        telemetry: Arc<dyn PoolTelemetry>,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        let runtime: tokio::runtime::Handle =
            tokio::runtime::Handle::try_current().map_err(|_| PoolError::NoRuntime)?;

        let capacity: usize = config.max_queue_depth.unwrap_or(UNBOUNDED_QUEUE_CAPACITY);
        let (sender, receiver) = mpsc::channel::<Job>(capacity);
        let receiver: Arc<AsyncMutex<mpsc::Receiver<Job>>> = Arc::new(AsyncMutex::new(receiver));

        let shared: Arc<PoolShared> = Arc::new(PoolShared {
            name: config.name.clone(),
            active: AtomicUsize::new(0),
            telemetry,
        });

        let workers: Vec<JoinHandle<()>> = (0..config.workers)
            .map(|worker_id: usize| {
                runtime.spawn(run_worker(
                    worker_id,
                    Arc::clone(&receiver),
                    Arc::clone(&shared),
                ))
            })
            .collect();

        tracing::debug!(
            pool = %config.name,
            workers = config.workers,
            max_queue_depth = ?config.max_queue_depth,
            "worker pool started"
        );

        Ok(Self {
            config,
            sender: Mutex::new(Some(sender)),
            workers: AsyncMutex::new(workers),
            shared,
        })
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Configured worker count.
    pub fn worker_count(&self) -> usize {
        self.config.workers
    }

    /// Enqueue a task and return its completion handle.
    ///
    /// Waits while the queue is full.
    ///
    /// # Arguments
    /// * `task` - Future producing the task's value
    ///
    /// # Returns
    /// A handle that resolves once a worker has run the task.
    ///
    /// # Errors
    /// Returns `Closed` if shutdown or abort has been initiated.
    pub async fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + Sync + 'static,
    {
        let sender: mpsc::Sender<Job> = self.sender()?;
        let (writer, handle) = outcome_slot::<T>();

        let job: Job = Box::pin(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(value) => {
                    writer.complete(Ok(value));
                    JobStatus::Completed
                }
                Err(payload) => {
                    let message: String = panic_message(payload.as_ref());
                    writer.complete(Err(TaskError::Panicked {
                        message: message.clone(),
                    }));
                    JobStatus::Panicked(message)
                }
            }
        });

        sender.send(job).await.map_err(|_| self.closed())?;
        Ok(handle)
    }

    /// Stop accepting tasks and wait for every accepted task to finish.
    ///
    /// Idempotent; concurrent callers all return once the workers have exited.
    pub async fn shutdown(&self) {
        self.close();
        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            if let Err(err) = worker.await {
                if err.is_panic() {
                    tracing::error!(pool = %self.config.name, "worker task panicked: {}", err);
                }
            }
        }
        tracing::debug!(pool = %self.config.name, "worker pool shut down");
    }

    /// Stop accepting tasks and cancel every worker.
    ///
    /// Running and queued tasks are dropped; their handles resolve to
    /// [`TaskError::Aborted`].
    pub async fn abort(&self) {
        self.close();
        let mut workers = self.workers.lock().await;
        for worker in workers.iter() {
            worker.abort();
        }
        for worker in workers.drain(..) {
            let _ = worker.await;
        }
        tracing::warn!(pool = %self.config.name, "worker pool aborted");
    }

    /// Whether shutdown or abort has been initiated.
    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .map(|sender| sender.is_none())
            .unwrap_or(true)
    }

    /// Number of tasks currently running.
    pub fn active_workers(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Number of tasks waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        match self.sender.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|sender| sender.max_capacity() - sender.capacity())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Job>, PoolError> {
        let guard = self.sender.lock().map_err(|_| self.closed())?;
        guard.as_ref().cloned().ok_or_else(|| self.closed())
    }

    fn close(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
    }

    fn closed(&self) -> PoolError {
        PoolError::Closed {
            pool: self.config.name.clone(),
        }
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<AsyncMutex<mpsc::Receiver<Job>>>,
    shared: Arc<PoolShared>,
) {
    loop {
        let next: Option<Job> = {
            let mut queue = receiver.lock().await;
            queue.recv().await
        };
        let Some(job) = next else {
            break;
        };

        shared.active.fetch_add(1, Ordering::AcqRel);
        shared.telemetry.on_task_started(&shared.name, worker_id);
        let started: Instant = Instant::now();

        let status: JobStatus = job.await;

        shared.active.fetch_sub(1, Ordering::AcqRel);
        match status {
            JobStatus::Completed => {
                shared
                    .telemetry
                    .on_task_finished(&shared.name, worker_id, started.elapsed());
            }
            JobStatus::Panicked(message) => {
                shared
                    .telemetry
                    .on_task_failed(&shared.name, worker_id, started.elapsed(), &message);
            }
        }
    }
    tracing::trace!(pool = %shared.name, worker_id, "worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
