//! Broker - the operations clients call.
//!
//! Cheap to clone; every clone shares the same store, client and config.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use super::cancel::{CancelOutcome, Canceller};
use super::config::BrokerConfig;
use super::waiter::ResponseWaiter;
use super::worker_loop::{Worker, WorkerGroup};
use crate::domain::{NewTask, Task, TaskId, TaskResult, TaskStatus};
use crate::error::{HtqError, Result};
use crate::ports::{BackingStore, Clock, HttpClient, IdGenerator};
use crate::store::{DispatchQueue, KeySpace, TaskStore};

#[derive(Clone)]
pub struct Broker {
    tasks: TaskStore,
    queue: DispatchQueue,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: BrokerConfig,
    canceller: Canceller,
    waiter: ResponseWaiter,
}

impl Broker {
    pub(crate) fn new(
        store: Arc<dyn BackingStore>,
        keys: KeySpace,
        config: BrokerConfig,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let queue = DispatchQueue::new(Arc::clone(&store), keys.send_queue.clone());
        let tasks = TaskStore::new(store, keys);
        let canceller = Canceller::new(tasks.clone(), Arc::clone(&http), config.cancel_max_attempts);
        let waiter = ResponseWaiter::new(tasks.clone(), config.wait_poll_interval());
        Self {
            tasks,
            queue,
            http,
            clock,
            ids,
            config,
            canceller,
            waiter,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeySpace {
        self.tasks.keys()
    }

    /// Store a new task as `queued` and append it to the dispatch queue.
    ///
    /// If the push fails the record is removed again, so a task that was
    /// never queued does not linger as `queued` forever.
    #[instrument(skip_all, fields(method = %new_task.method, url = %new_task.url))]
    pub async fn submit(&self, new_task: NewTask) -> Result<TaskId> {
        let id = self.ids.generate_task_id();
        let task = new_task.into_task(id, self.clock.now(), self.config.default_timeout_secs)?;

        self.tasks.create(&task).await?;
        if let Err(e) = self.queue.push(id).await {
            if let Err(cleanup) = self.tasks.delete(id).await {
                warn!(task_id = %id, error = %cleanup, "could not remove task after failed enqueue");
            }
            return Err(e);
        }

        info!(task_id = %id, timeout = task.timeout, "task submitted");
        Ok(id)
    }

    pub async fn status(&self, id: TaskId) -> Result<TaskStatus> {
        Ok(self.tasks.get(id).await?.status)
    }

    /// The full task record.
    pub async fn get(&self, id: TaskId) -> Result<Task> {
        self.tasks.get(id).await
    }

    /// Tasks in the dispatch queue that are still waiting to run, head first.
    pub async fn list_queued(&self) -> Result<Vec<Task>> {
        let mut queued = Vec::new();
        for id in self.queue.list().await? {
            match self.tasks.get(id).await {
                Ok(task) if task.status == TaskStatus::Queued => queued.push(task),
                Ok(_) | Err(HtqError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(queued)
    }

    /// Raw length of the dispatch queue, including ids that will be skipped.
    pub async fn queue_len(&self) -> Result<usize> {
        self.queue.len().await
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, id: TaskId) -> Result<CancelOutcome> {
        self.canceller.cancel(id).await
    }

    /// Wait until the task is finished and return it with its response.
    pub async fn await_response(&self, id: TaskId, deadline: Option<Duration>) -> Result<TaskResult> {
        self.waiter.wait(id, deadline).await
    }

    /// Delete the stored response of a task. `NotFound` if there was none.
    pub async fn purge_response(&self, id: TaskId) -> Result<()> {
        if self.tasks.delete_response(id).await? {
            info!(task_id = %id, "response purged");
            Ok(())
        } else {
            Err(HtqError::NotFound(id))
        }
    }

    pub fn worker(&self, id: usize) -> Worker {
        Worker::new(
            id,
            self.tasks.clone(),
            self.queue.clone(),
            Arc::clone(&self.http),
            self.config.worker_idle(),
        )
    }

    pub fn spawn_workers(&self, n: usize) -> WorkerGroup {
        info!(workers = n, queue = self.queue.name(), "starting workers");
        WorkerGroup::spawn(n, |i| self.worker(i))
    }
}
