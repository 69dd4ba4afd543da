//! Key layout in the backing store.

use serde::{Deserialize, Serialize};

use crate::domain::TaskId;

/// Where records and the dispatch queue live.
///
/// The defaults keep the `htq:` layout: `htq:requests:<id>` for tasks,
/// `htq:responses:<id>` for stored responses and `htq:send` for the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySpace {
    pub task_prefix: String,
    pub response_prefix: String,
    pub send_queue: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self {
            task_prefix: "htq:requests:".to_string(),
            response_prefix: "htq:responses:".to_string(),
            send_queue: "htq:send".to_string(),
        }
    }
}

impl KeySpace {
    pub fn task_key(&self, id: TaskId) -> String {
        format!("{}{}", self.task_prefix, id)
    }

    pub fn response_key(&self, id: TaskId) -> String {
        format!("{}{}", self.response_prefix, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn default_layout() {
        let keys = KeySpace::default();
        let id = TaskId::from_ulid(Ulid::new());
        assert_eq!(keys.task_key(id), format!("htq:requests:{id}"));
        assert_eq!(keys.response_key(id), format!("htq:responses:{id}"));
        assert_eq!(keys.send_queue, "htq:send");
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let keys: KeySpace = serde_json::from_str(r#"{"send_queue": "test:send"}"#).unwrap();
        assert_eq!(keys.send_queue, "test:send");
        assert_eq!(keys.task_prefix, "htq:requests:");
    }
}
