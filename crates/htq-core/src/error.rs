use thiserror::Error;

use crate::domain::TaskId;
use crate::ports::StoreError;

/// Errors surfaced by broker operations.
///
/// Outbound call failures during execution are not here: the worker records
/// them as the task's terminal status instead of returning them.
#[derive(Debug, Error)]
pub enum HtqError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),

    #[error("conflicting updates on task {task_id}, gave up after {attempts} attempts")]
    Conflict { task_id: TaskId, attempts: u32 },

    #[error("upstream call failed: {0}")]
    Upstream(String),

    #[error("upstream call timed out after {0}s")]
    Timeout(u64),

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("gave up waiting for task {0} to finish")]
    WaitDeadlineExceeded(TaskId),

    #[error("backing store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

pub type Result<T, E = HtqError> = std::result::Result<T, E>;
