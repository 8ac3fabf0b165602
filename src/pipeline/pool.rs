//! Fixed-size worker pool for chunk processing
//!
//! Workers are long-lived tokio tasks spawned when the pool is built. They share
//! one FIFO channel, so tasks are handed out in submission order to whichever
//! worker is idle first and excess tasks wait in the channel. The chunk handler
//! itself runs on the blocking thread pool, which keeps a panicking or failing
//! task from taking its worker down with it.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use super::aggregate::Aggregate;
use super::chunk::{ProcessDataPayload, WorkerMessage};
use super::processor::{ChunkHandler, ChunkProcessor, ProcessingError};

/// Upper bound on workers, whatever the configuration asks for
pub const MAX_WORKERS: usize = 16;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoolError {
    #[error("task {task_id} was cancelled before it completed")]
    Cancelled { task_id: u64 },

    #[error("worker pool has been shut down")]
    ShutDown,

    #[error("task {task_id} failed: {source}")]
    TaskFailed {
        task_id: u64,
        #[source]
        source: ProcessingError,
    },

    #[error("worker {worker_id} panicked while running task {task_id}: {message}")]
    WorkerPanicked {
        task_id: u64,
        worker_id: usize,
        message: String,
    },
}

impl PoolError {
    pub fn task_id(&self) -> Option<u64> {
        match self {
            Self::Cancelled { task_id }
            | Self::TaskFailed { task_id, .. }
            | Self::WorkerPanicked { task_id, .. } => Some(*task_id),
            Self::ShutDown => None,
        }
    }
}

/// Lifecycle state of a single worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Busy,
    Terminated,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Busy,
            _ => Self::Terminated,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Busy => 1,
            Self::Terminated => 2,
        }
    }
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub total_workers: usize,
    pub active_workers: usize,
    pub queued_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
}

type TaskResult = Result<Aggregate, PoolError>;

struct Job {
    task_id: u64,
    message: WorkerMessage,
    reply: oneshot::Sender<TaskResult>,
}

/// Counters shared between the pool handle and its workers
struct PoolShared {
    states: Vec<AtomicU8>,
    queued: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    shut_down: AtomicBool,
}

impl PoolShared {
    fn set_state(&self, worker_id: usize, state: WorkerState) {
        // a terminated worker never comes back
        let _ = self.states[worker_id].fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
            (WorkerState::from_u8(raw) != WorkerState::Terminated).then_some(state.as_u8())
        });
    }

    /// Never wraps below zero; shutdown may reset the count under a running worker
    fn dequeued(&self) {
        let _ = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    fn state(&self, worker_id: usize) -> WorkerState {
        WorkerState::from_u8(self.states[worker_id].load(Ordering::Acquire))
    }
}

/// Pending result of a submitted task
///
/// Resolves to the partial aggregate, or to the error that rejected this task.
/// A task whose worker is torn down resolves to [`PoolError::Cancelled`].
#[derive(Debug)]
pub struct TaskHandle {
    task_id: u64,
    rx: oneshot::Receiver<TaskResult>,
}

impl TaskHandle {
    pub fn task_id(&self) -> u64 {
        self.task_id
    }
}

impl Future for TaskHandle {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let task_id = self.task_id;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(PoolError::Cancelled { task_id })))
    }
}

pub struct WorkerPool {
    tx: mpsc::UnboundedSender<Job>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<PoolShared>,
    next_task_id: AtomicU64,
}

impl WorkerPool {
    /// Spawn `worker_count` workers running `handler`
    ///
    /// The count is clamped to `1..=MAX_WORKERS`. Must be called from within a
    /// tokio runtime.
    pub fn new(worker_count: usize, handler: Arc<dyn ChunkHandler>) -> Self {
        let worker_count = worker_count.clamp(1, MAX_WORKERS);
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let shared = Arc::new(PoolShared {
            states: (0..worker_count).map(|_| AtomicU8::new(0)).collect(),
            queued: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        });

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&handler),
                    Arc::clone(&shared),
                ))
            })
            .collect();

        info!("Worker pool started with {} workers", worker_count);

        Self {
            tx,
            workers,
            shared,
            next_task_id: AtomicU64::new(1),
        }
    }

    /// Pool running the standard [`ChunkProcessor`]
    pub fn with_processor(worker_count: usize) -> Self {
        Self::new(worker_count, Arc::new(ChunkProcessor))
    }

    /// Queue a chunk for processing
    pub fn submit(&self, payload: ProcessDataPayload) -> Result<TaskHandle, PoolError> {
        self.submit_message(WorkerMessage::ProcessData(payload))
    }

    pub fn submit_message(&self, message: WorkerMessage) -> Result<TaskHandle, PoolError> {
        if self.is_shut_down() {
            return Err(PoolError::ShutDown);
        }

        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        self.shared.queued.fetch_add(1, Ordering::AcqRel);

        if self
            .tx
            .send(Job {
                task_id,
                message,
                reply,
            })
            .is_err()
        {
            self.shared.dequeued();
            return Err(PoolError::ShutDown);
        }

        debug!("Queued task {}", task_id);
        Ok(TaskHandle { task_id, rx })
    }

    pub fn stats(&self) -> PoolStats {
        let states = self.worker_states();
        PoolStats {
            total_workers: states
                .iter()
                .filter(|s| **s != WorkerState::Terminated)
                .count(),
            active_workers: states.iter().filter(|s| **s == WorkerState::Busy).count(),
            queued_tasks: self.shared.queued.load(Ordering::Acquire),
            completed_tasks: self.shared.completed.load(Ordering::Acquire),
            failed_tasks: self.shared.failed.load(Ordering::Acquire),
        }
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        (0..self.shared.states.len())
            .map(|id| self.shared.state(id))
            .collect()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    /// Terminate every worker
    ///
    /// Queued and in-flight tasks resolve to [`PoolError::Cancelled`]; later
    /// submissions fail with [`PoolError::ShutDown`]. Calling it twice is a no-op.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        for (worker_id, handle) in self.workers.iter().enumerate() {
            handle.abort();
            self.shared.states[worker_id].store(WorkerState::Terminated.as_u8(), Ordering::Release);
        }
        // aborted workers drop whatever was still queued
        self.shared.queued.store(0, Ordering::Release);
        info!(
            "Worker pool shut down ({} completed, {} failed)",
            self.shared.completed.load(Ordering::Acquire),
            self.shared.failed.load(Ordering::Acquire)
        );
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("stats", &self.stats())
            .finish()
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    handler: Arc<dyn ChunkHandler>,
    shared: Arc<PoolShared>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        // the receiver lock is fair, so idle workers take jobs in turn
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };
        shared.dequeued();
        shared.set_state(worker_id, WorkerState::Busy);

        let Job {
            task_id,
            message,
            reply,
        } = job;
        let payload = message.into_payload();
        let task_handler = Arc::clone(&handler);
        let outcome = tokio::task::spawn_blocking(move || task_handler.handle(payload)).await;

        let result = match outcome {
            Ok(Ok(aggregate)) => {
                shared.completed.fetch_add(1, Ordering::AcqRel);
                Ok(aggregate)
            }
            Ok(Err(source)) => {
                shared.failed.fetch_add(1, Ordering::AcqRel);
                warn!("Task {} failed on worker {}: {}", task_id, worker_id, source);
                Err(PoolError::TaskFailed { task_id, source })
            }
            Err(join_error) => {
                shared.failed.fetch_add(1, Ordering::AcqRel);
                let message = panic_message(join_error);
                warn!(
                    "Worker {} panicked on task {}: {}",
                    worker_id, task_id, message
                );
                Err(PoolError::WorkerPanicked {
                    task_id,
                    worker_id,
                    message,
                })
            }
        };

        if shared.shut_down.load(Ordering::Acquire) {
            let _ = reply.send(Err(PoolError::Cancelled { task_id }));
            break;
        }

        // the submitter may have stopped waiting
        let _ = reply.send(result);
        shared.set_state(worker_id, WorkerState::Idle);
    }

    shared.set_state(worker_id, WorkerState::Terminated);
    debug!("Worker {} stopped", worker_id);
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
