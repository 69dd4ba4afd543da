use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use super::{TaskId, TaskStatus};
use crate::error::HtqError;

/// Header mapping carried opaquely through the broker. Keys are unique.
pub type Headers = BTreeMap<String, String>;

/// Outbound timeout used when a submission does not carry one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// What a client asks the broker to execute.
///
/// This is the input of the submission path. It becomes a [`Task`] once it
/// has been validated and given an id and creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: Headers,

    #[serde(default)]
    pub data: String,

    /// Seconds. `None` falls back to the broker default.
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl NewTask {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: Headers::new(),
            data: String::new(),
            timeout: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Validate and turn into a queued task.
    pub fn into_task(
        self,
        id: TaskId,
        created_at: DateTime<Utc>,
        default_timeout: u64,
    ) -> Result<Task, HtqError> {
        let url = Url::parse(&self.url)
            .map_err(|e| HtqError::InvalidTask(format!("url {:?}: {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HtqError::InvalidTask(format!(
                "url {:?}: unsupported scheme {:?}",
                self.url,
                url.scheme()
            )));
        }

        let method = self.method.trim().to_ascii_uppercase();
        if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic() || b == b'-') {
            return Err(HtqError::InvalidTask(format!("method {:?}", self.method)));
        }

        if let Some(name) = self.headers.keys().find(|name| name.trim().is_empty()) {
            return Err(HtqError::InvalidTask(format!("header name {name:?}")));
        }

        let timeout = self.timeout.unwrap_or(default_timeout);
        if timeout == 0 {
            return Err(HtqError::InvalidTask("timeout must be at least 1s".to_string()));
        }

        Ok(Task {
            id,
            url: self.url,
            method,
            headers: self.headers,
            data: self.data,
            timeout,
            created_at,
            status: TaskStatus::Queued,
        })
    }
}

/// The durable lifecycle record of one outbound call.
///
/// Everything except `status` is fixed at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "uuid")]
    pub id: TaskId,
    pub url: String,
    pub method: String,
    pub headers: Headers,
    pub data: String,
    /// Seconds bounding the outbound call.
    pub timeout: u64,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
}

impl Task {
    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use ulid::Ulid;

    fn id() -> TaskId {
        TaskId::from_ulid(Ulid::new())
    }

    #[test]
    fn valid_submission_becomes_queued_task() {
        let task = NewTask::get("http://x/y")
            .with_method("post")
            .with_header("Accept", "text/plain")
            .with_data("payload")
            .with_timeout(5)
            .into_task(id(), Utc::now(), DEFAULT_TIMEOUT_SECS)
            .unwrap();

        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.method, "POST");
        assert_eq!(task.timeout, 5);
        assert_eq!(task.headers.get("Accept").map(String::as_str), Some("text/plain"));
    }

    #[test]
    fn missing_timeout_uses_default() {
        let task = NewTask::get("https://example.com")
            .into_task(id(), Utc::now(), 42)
            .unwrap();
        assert_eq!(task.timeout, 42);
    }

    #[rstest]
    #[case(NewTask::get("not a url"))]
    #[case(NewTask::get("ftp://example.com/file"))]
    #[case(NewTask::get("http://x/y").with_method("GE T"))]
    #[case(NewTask::get("http://x/y").with_method(""))]
    #[case(NewTask::get("http://x/y").with_timeout(0))]
    #[case(NewTask::get("http://x/y").with_header(" ", "v"))]
    fn invalid_submissions_are_rejected(#[case] new_task: NewTask) {
        let err = new_task
            .into_task(id(), Utc::now(), DEFAULT_TIMEOUT_SECS)
            .unwrap_err();
        assert!(matches!(err, HtqError::InvalidTask(_)));
    }

    #[test]
    fn submission_json_defaults() {
        let new_task: NewTask = serde_json::from_str(r#"{"url": "http://x/y"}"#).unwrap();
        assert_eq!(new_task.method, "GET");
        assert!(new_task.headers.is_empty());
        assert_eq!(new_task.timeout, None);
    }

    #[test]
    fn task_json_uses_uuid_field() {
        let task = NewTask::get("http://x/y")
            .into_task(id(), Utc::now(), DEFAULT_TIMEOUT_SECS)
            .unwrap();
        let v = serde_json::to_value(&task).unwrap();
        assert_eq!(v["uuid"], task.id.to_string());
        assert_eq!(v["status"], "queued");
    }
}
