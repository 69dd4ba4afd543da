//! Task identifier.
//!
//! Task ids are ULIDs: 128-bit, time-ordered, and generated without
//! coordination. The textual 26-character Crockford form is what gets stored
//! in record keys and handed to clients as the task `uuid`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Identifier of a submitted task.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Ulid);

impl TaskId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Returned when a string is not a valid task id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed task id: {0:?}")]
pub struct ParseTaskIdError(pub String);

impl FromStr for TaskId {
    type Err = ParseTaskIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s.trim())
            .map(Self)
            .map_err(|_| ParseTaskIdError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let id = TaskId::from_ulid(Ulid::new());
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.to_string().len(), 26);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = "not-a-task".parse::<TaskId>().unwrap_err();
        assert_eq!(err, ParseTaskIdError("not-a-task".to_string()));
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let id1 = TaskId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::from_ulid(Ulid::new());
        assert!(id1 < id2);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = TaskId::from_ulid(Ulid::new());
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, format!("\"{id}\""));
    }
}
