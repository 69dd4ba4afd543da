//! Task lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a task.
///
/// State transitions:
/// - Queued -> Pending -> Success | Timeout | Error
/// - any non-canceled state -> Canceled
///
/// Nothing re-enters Queued or Pending once a task has reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the dispatch queue.
    Queued,

    /// Claimed by a worker; the outbound call may be in flight.
    Pending,

    /// The remote answered with a 2xx response, which is stored.
    Success,

    /// The outbound call exceeded the task timeout.
    Timeout,

    /// Transport failure or non-2xx answer.
    Error,

    /// Canceled by a client.
    Canceled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Queued,
        TaskStatus::Pending,
        TaskStatus::Success,
        TaskStatus::Timeout,
        TaskStatus::Error,
        TaskStatus::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Pending => "pending",
            TaskStatus::Success => "success",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Error => "error",
            TaskStatus::Canceled => "canceled",
        }
    }

    /// Is this a terminal state (no further automatic transitions)?
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Queued or pending: the task still has work ahead of it.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Pending)
    }

    /// Finished by a worker (as opposed to canceled).
    pub fn is_completed(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Timeout | TaskStatus::Error
        )
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Queued, TaskStatus::Pending) => true,
            (TaskStatus::Pending, next) if next.is_completed() => true,
            (TaskStatus::Canceled, _) => false,
            (_, TaskStatus::Canceled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0:?}")]
pub struct ParseStatusError(pub String);

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn text_form_round_trips() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[rstest]
    #[case(TaskStatus::Queued, TaskStatus::Pending, true)]
    #[case(TaskStatus::Pending, TaskStatus::Success, true)]
    #[case(TaskStatus::Pending, TaskStatus::Timeout, true)]
    #[case(TaskStatus::Pending, TaskStatus::Error, true)]
    #[case(TaskStatus::Queued, TaskStatus::Canceled, true)]
    #[case(TaskStatus::Success, TaskStatus::Canceled, true)]
    #[case(TaskStatus::Queued, TaskStatus::Success, false)]
    #[case(TaskStatus::Success, TaskStatus::Pending, false)]
    #[case(TaskStatus::Error, TaskStatus::Queued, false)]
    #[case(TaskStatus::Canceled, TaskStatus::Canceled, false)]
    #[case(TaskStatus::Canceled, TaskStatus::Queued, false)]
    fn transitions(#[case] from: TaskStatus, #[case] to: TaskStatus, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn classification() {
        assert!(TaskStatus::Queued.is_active());
        assert!(TaskStatus::Pending.is_active());
        assert!(TaskStatus::Canceled.is_terminal());
        assert!(!TaskStatus::Canceled.is_completed());
        assert!(TaskStatus::Timeout.is_completed());
    }
}
