//! HttpClient port - the outbound call a worker performs for a task.
//!
//! TLS, pooling and redirects belong to the implementation. The broker only
//! needs "send this, give up after that long".

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Headers, Task, TaskResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: String,
}

impl OutboundRequest {
    /// The call described by a task.
    pub fn for_task(task: &Task) -> Self {
        Self {
            method: task.method.clone(),
            url: task.url.clone(),
            headers: task.headers.clone(),
            body: task.data.clone(),
        }
    }

    /// The compensating `DELETE` sent when a running task is canceled.
    pub fn delete(url: impl Into<String>) -> Self {
        Self {
            method: "DELETE".to_string(),
            url: url.into(),
            headers: Headers::new(),
            body: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("timed out")]
    Timeout,

    #[error("{0}")]
    Transport(String),
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform `request`, failing with [`CallError::Timeout`] once `timeout`
    /// has elapsed. Any HTTP status, including non-2xx, is an `Ok` response.
    async fn send(&self, request: &OutboundRequest, timeout: Duration) -> Result<TaskResponse, CallError>;
}
