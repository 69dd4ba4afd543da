use serde::{Deserialize, Serialize};

use super::{Headers, Task, TaskStatus};

/// What the remote answered, as stored once a task succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub status_code: u16,
    pub headers: Headers,
    /// Decoded as UTF-8; invalid sequences are replaced with U+FFFD, so a
    /// binary payload does not survive the round trip.
    pub body: String,
}

impl TaskResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// A finished task together with its stored response, if it has one.
///
/// Only `success` carries a response; every other terminal status comes back
/// with `response: None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: Task,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<TaskResponse>,
}

impl TaskResult {
    pub fn status(&self) -> TaskStatus {
        self.task.status
    }
}
