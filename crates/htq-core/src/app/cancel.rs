//! Canceller - idempotent cancellation with optimistic retries.
//!
//! Each attempt reads the task and issues one conditional write against the
//! status it saw. Losing that write means a worker (or another canceller)
//! moved the task in between: read again and decide again, up to
//! `max_attempts` times.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{Task, TaskId, TaskStatus};
use crate::error::{HtqError, Result};
use crate::ports::{CallError, HttpClient, OutboundRequest};
use crate::store::TaskStore;

/// How a successful `cancel` got there. Every variant means the task is now
/// `canceled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Nothing to do.
    AlreadyCanceled,
    /// Canceled while `queued`; it will never be executed.
    Dequeued,
    /// Canceled while `pending`; a `DELETE` was sent to the task's url.
    Interrupted { compensation: Compensation },
    /// Canceled after it finished; its stored response was dropped.
    Revoked { previous: TaskStatus },
}

/// Result of the compensating `DELETE`. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum Compensation {
    /// The remote answered 2xx.
    Acknowledged(u16),
    /// The remote answered, but not with 2xx.
    Rejected(u16),
    /// The request could not be completed.
    Failed(String),
}

#[derive(Clone)]
pub struct Canceller {
    tasks: TaskStore,
    http: Arc<dyn HttpClient>,
    max_attempts: u32,
}

impl Canceller {
    pub fn new(tasks: TaskStore, http: Arc<dyn HttpClient>, max_attempts: u32) -> Self {
        Self {
            tasks,
            http,
            max_attempts,
        }
    }

    pub async fn cancel(&self, id: TaskId) -> Result<CancelOutcome> {
        for attempt in 1..=self.max_attempts {
            let task = self.tasks.get(id).await?;
            let observed = task.status;

            let won = match observed {
                TaskStatus::Canceled => return Ok(CancelOutcome::AlreadyCanceled),
                s if s.is_completed() => self.tasks.cancel_completed(id, s).await?,
                s => {
                    self.tasks
                        .set_status_if_unchanged(id, s, TaskStatus::Canceled)
                        .await?
                }
            };

            if won {
                info!(task_id = %id, previous = %observed, "task canceled");
                return Ok(match observed {
                    TaskStatus::Queued => CancelOutcome::Dequeued,
                    TaskStatus::Pending => CancelOutcome::Interrupted {
                        compensation: self.compensate(&task).await,
                    },
                    previous => CancelOutcome::Revoked { previous },
                });
            }

            debug!(task_id = %id, attempt, %observed, "cancel lost a race, retrying");
            tokio::task::yield_now().await;
        }

        warn!(task_id = %id, attempts = self.max_attempts, "cancel kept conflicting, giving up");
        Err(HtqError::Conflict {
            task_id: id,
            attempts: self.max_attempts,
        })
    }

    /// Ask the remote to undo a call that may already be in progress.
    async fn compensate(&self, task: &Task) -> Compensation {
        let request = OutboundRequest::delete(task.url.clone());
        let limit = task.timeout_duration();
        let sent = tokio::time::timeout(limit, self.http.send(&request, limit))
            .await
            .unwrap_or(Err(CallError::Timeout));

        let compensation = match sent {
            Ok(response) if response.is_success() => Compensation::Acknowledged(response.status_code),
            Ok(response) => Compensation::Rejected(response.status_code),
            Err(e) => Compensation::Failed(e.to_string()),
        };
        debug!(task_id = %task.id, url = %task.url, ?compensation, "compensating DELETE sent");
        compensation
    }
}
