//! WorkerLoop - the task execution loop.
//!
//! pop → claim (`queued → pending`) → call → complete (`pending → terminal`).
//!
//! Claim and completion are both conditional writes. Losing the claim means a
//! canceller got there first and the call is never made; losing the completion
//! means the task was canceled while the call was in flight, and the outcome
//! is thrown away.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{Task, TaskId, TaskResponse, TaskStatus};
use crate::error::{HtqError, Result};
use crate::ports::{CallError, HttpClient, OutboundRequest};
use crate::store::{DispatchQueue, TaskStore};

/// Why a popped id was not executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The task record is gone (or unreadable).
    Missing,
    /// The task had already left `queued`, normally because it was canceled.
    NotQueued(TaskStatus),
    /// The status changed between the read and the claim.
    ClaimLost,
}

/// What one iteration of the loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStep {
    /// The queue was empty.
    Idle,
    Skipped { task_id: TaskId, reason: SkipReason },
    /// The call ran and its outcome was recorded.
    Finished { task_id: TaskId, status: TaskStatus },
    /// The call ran but the task was canceled meanwhile; nothing was recorded.
    Discarded { task_id: TaskId, status: TaskStatus },
}

/// Map a call result onto the task's terminal status.
///
/// Only a 2xx answer is a success. Everything else is turned into the error
/// the caller would have seen, then into `timeout` or `error`.
pub fn classify(task: &Task, call: std::result::Result<TaskResponse, CallError>) -> Result<TaskResponse> {
    match call {
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) => Err(HtqError::Upstream(format!(
            "{} {} answered {}",
            task.method, task.url, response.status_code
        ))),
        Err(CallError::Timeout) => Err(HtqError::Timeout(task.timeout)),
        Err(CallError::Transport(reason)) => Err(HtqError::Upstream(reason)),
    }
}

/// Store writes a worker retries before giving up on a popped task.
const STORE_ATTEMPTS: u32 = 3;

fn terminal_status(err: &HtqError) -> TaskStatus {
    match err {
        HtqError::Timeout(_) => TaskStatus::Timeout,
        _ => TaskStatus::Error,
    }
}

pub struct Worker {
    id: usize,
    tasks: TaskStore,
    queue: DispatchQueue,
    http: Arc<dyn HttpClient>,
    idle: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        tasks: TaskStore,
        queue: DispatchQueue,
        http: Arc<dyn HttpClient>,
        idle: Duration,
    ) -> Self {
        Self {
            id,
            tasks,
            queue,
            http,
            idle,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Take at most one task off the queue and drive it to completion.
    ///
    /// Errors are store failures only; call failures end up in the task's status.
    /// A store failure between pop and claim puts the id back on the queue.
    pub async fn step(&self) -> Result<WorkerStep> {
        let Some(task_id) = self.queue.pop().await? else {
            return Ok(WorkerStep::Idle);
        };

        let task = match self.claim(task_id).await {
            Ok(Ok(task)) => task,
            Ok(Err(reason)) => return Ok(self.skipped(task_id, reason)),
            Err(e) => {
                self.requeue(task_id).await;
                return Err(e);
            }
        };

        info!(worker_id = self.id, %task_id, method = %task.method, url = %task.url, "executing task");
        let (status, response) = match self.execute(&task).await {
            Ok(response) => (TaskStatus::Success, Some(response)),
            Err(e) => {
                warn!(worker_id = self.id, %task_id, error = %e, "task call failed");
                (terminal_status(&e), None)
            }
        };

        if self.record(task_id, status, response.as_ref()).await? {
            info!(worker_id = self.id, %task_id, %status, "task finished");
            Ok(WorkerStep::Finished { task_id, status })
        } else {
            info!(worker_id = self.id, %task_id, %status, "task was canceled in flight, discarding outcome");
            Ok(WorkerStep::Discarded { task_id, status })
        }
    }

    /// Read the popped task and move it `queued → pending`.
    async fn claim(&self, task_id: TaskId) -> Result<std::result::Result<Task, SkipReason>> {
        let task = match self.tasks.get(task_id).await {
            Ok(task) => task,
            Err(HtqError::NotFound(_)) => return Ok(Err(SkipReason::Missing)),
            Err(e) => return Err(e),
        };

        if task.status != TaskStatus::Queued {
            return Ok(Err(SkipReason::NotQueued(task.status)));
        }

        if !self
            .tasks
            .set_status_if_unchanged(task_id, TaskStatus::Queued, TaskStatus::Pending)
            .await?
        {
            return Ok(Err(SkipReason::ClaimLost));
        }
        Ok(Ok(task))
    }

    /// Push an id back after the store failed before its claim. It rejoins
    /// at the tail.
    async fn requeue(&self, task_id: TaskId) {
        for attempt in 1..=STORE_ATTEMPTS {
            match self.queue.push(task_id).await {
                Ok(()) => {
                    warn!(worker_id = self.id, %task_id, "store failed before claim, task re-queued");
                    return;
                }
                Err(e) => {
                    warn!(worker_id = self.id, %task_id, attempt, error = %e, "re-queue failed");
                    tokio::time::sleep(self.idle).await;
                }
            }
        }
        error!(worker_id = self.id, %task_id, "could not re-queue task, it is queued but off the queue");
    }

    /// Conditional completion, retried on store failures so a short outage
    /// does not strand the task in `pending`.
    async fn record(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        response: Option<&TaskResponse>,
    ) -> Result<bool> {
        let mut attempt = 1;
        loop {
            match self.tasks.complete(task_id, status, response).await {
                Ok(committed) => return Ok(committed),
                Err(e) if attempt < STORE_ATTEMPTS => {
                    warn!(worker_id = self.id, %task_id, attempt, error = %e, "recording outcome failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.idle).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The client is asked to respect the timeout too, but the worker enforces
    /// it on its own so a misbehaving client cannot hold a task in `pending`.
    async fn execute(&self, task: &Task) -> Result<TaskResponse> {
        let request = OutboundRequest::for_task(task);
        let limit = task.timeout_duration();
        let call = tokio::time::timeout(limit, self.http.send(&request, limit))
            .await
            .unwrap_or(Err(CallError::Timeout));
        classify(task, call)
    }

    fn skipped(&self, task_id: TaskId, reason: SkipReason) -> WorkerStep {
        debug!(worker_id = self.id, %task_id, ?reason, "skipping task");
        WorkerStep::Skipped { task_id, reason }
    }

    /// Loop until shutdown is requested (or the sender goes away).
    ///
    /// A call that is already running is finished first; shutdown is only
    /// observed between tasks and while idle.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(worker_id = self.id, "worker started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let idle = match self.step().await {
                Ok(WorkerStep::Idle) => true,
                Ok(_) => false,
                Err(e) => {
                    error!(worker_id = self.id, error = %e, "worker step failed, backing off");
                    true
                }
            };
            if !idle {
                continue;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.idle) => {}
            }
        }
        info!(worker_id = self.id, "worker stopped");
    }
}

/// Worker group handle.
/// - `request_shutdown()` stops workers from taking new tasks
/// - `shutdown_and_join()` also waits for in-flight calls to finish
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers built by `make_worker(index)`.
    pub fn spawn(n: usize, mut make_worker: impl FnMut(usize) -> Worker) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let joins = (0..n)
            .map(|i| tokio::spawn(make_worker(i).run(shutdown_rx.clone())))
            .collect();
        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker task panicked");
            }
        }
    }
}
