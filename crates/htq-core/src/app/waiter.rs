//! ResponseWaiter - poll a task until it leaves `queued`/`pending`.
//!
//! Dropping the returned future stops the polling; nothing else needs
//! cleaning up.

use std::time::Duration;

use tracing::debug;

use crate::domain::{TaskId, TaskResult};
use crate::error::{HtqError, Result};
use crate::store::TaskStore;

#[derive(Clone)]
pub struct ResponseWaiter {
    tasks: TaskStore,
    poll: Duration,
}

impl ResponseWaiter {
    pub fn new(tasks: TaskStore, poll: Duration) -> Self {
        Self { tasks, poll }
    }

    /// Wait for the task to finish, giving up with `WaitDeadlineExceeded`
    /// after `deadline` if one is given.
    pub async fn wait(&self, id: TaskId, deadline: Option<Duration>) -> Result<TaskResult> {
        match deadline {
            Some(limit) => tokio::time::timeout(limit, self.poll_until_finished(id))
                .await
                .map_err(|_| HtqError::WaitDeadlineExceeded(id))?,
            None => self.poll_until_finished(id).await,
        }
    }

    async fn poll_until_finished(&self, id: TaskId) -> Result<TaskResult> {
        loop {
            let task = self.tasks.get(id).await?;
            if task.status.is_terminal() {
                let response = self.tasks.get_response(id).await?;
                // a cancel may have slipped in between the two reads
                if self.tasks.get(id).await?.status == task.status {
                    return Ok(TaskResult { task, response });
                }
                debug!(task_id = %id, "status moved while reading the response, re-reading");
                continue;
            }
            tokio::time::sleep(self.poll).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Headers, NewTask, TaskResponse, TaskStatus};
    use crate::impls::InMemoryStore;
    use crate::store::KeySpace;
    use chrono::Utc;
    use std::sync::Arc;
    use ulid::Ulid;

    fn setup() -> (InMemoryStore, TaskStore, ResponseWaiter) {
        let backing = InMemoryStore::new();
        let tasks = TaskStore::new(Arc::new(backing.clone()), KeySpace::default());
        let waiter = ResponseWaiter::new(tasks.clone(), Duration::from_millis(5));
        (backing, tasks, waiter)
    }

    async fn queued(tasks: &TaskStore) -> TaskId {
        let task = NewTask::get("http://x/y")
            .into_task(TaskId::from_ulid(Ulid::new()), Utc::now(), 60)
            .unwrap();
        tasks.create(&task).await.unwrap();
        task.id
    }

    fn ok() -> TaskResponse {
        TaskResponse {
            status_code: 200,
            headers: Headers::new(),
            body: "ok".to_string(),
        }
    }

    #[tokio::test]
    async fn returns_once_finished_with_response() {
        let (_, tasks, waiter) = setup();
        let id = queued(&tasks).await;

        let waiting = tokio::spawn({
            let waiter = waiter.clone();
            async move { waiter.wait(id, None).await }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiting.is_finished());
        tasks.set_status(id, TaskStatus::Pending).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiting.is_finished());
        tasks.complete(id, TaskStatus::Success, Some(&ok())).await.unwrap();

        let result = waiting.await.unwrap().unwrap();
        assert_eq!(result.status(), TaskStatus::Success);
        assert_eq!(result.response, Some(ok()));
    }

    #[tokio::test]
    async fn failed_task_has_no_response() {
        let (_, tasks, waiter) = setup();
        let id = queued(&tasks).await;
        tasks.set_status(id, TaskStatus::Pending).await.unwrap();
        tasks.complete(id, TaskStatus::Timeout, None).await.unwrap();

        let result = waiter.wait(id, None).await.unwrap();
        assert_eq!(result.status(), TaskStatus::Timeout);
        assert_eq!(result.response, None);
    }

    #[tokio::test]
    async fn deadline_is_enforced() {
        let (_, tasks, waiter) = setup();
        let id = queued(&tasks).await;

        let err = waiter
            .wait(id, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, HtqError::WaitDeadlineExceeded(got) if got == id));
    }

    #[tokio::test]
    async fn vanished_task_is_not_found() {
        let (_, tasks, waiter) = setup();
        let id = queued(&tasks).await;

        let waiting = tokio::spawn({
            let waiter = waiter.clone();
            async move { waiter.wait(id, None).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tasks.delete(id).await.unwrap();

        let err = waiting.await.unwrap().unwrap_err();
        assert!(matches!(err, HtqError::NotFound(_)));
    }

    #[tokio::test]
    async fn store_outage_surfaces() {
        let (backing, tasks, waiter) = setup();
        let id = queued(&tasks).await;
        backing.set_available(false);

        let err = waiter.wait(id, None).await.unwrap_err();
        assert!(matches!(err, HtqError::StoreUnavailable(_)));
    }
}
