//! ScriptedHttpClient - replays canned replies and records every call.
//!
//! Lets the worker and the cancellation path run without a network: each
//! `(method, url)` pair gets a [`Reply`], and the calls that were made can be
//! inspected afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Headers, TaskResponse};
use crate::ports::{CallError, HttpClient, OutboundRequest};

#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with `status` and `body` after `delay`.
    Respond {
        status: u16,
        body: String,
        delay: Duration,
    },
    /// Never answer; the call runs into its timeout.
    Hang,
    /// Fail at the transport level.
    Fail(String),
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Reply::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Reply::Respond {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn after(self, wait: Duration) -> Self {
        match self {
            Reply::Respond { status, body, .. } => Reply::Respond {
                status,
                body,
                delay: wait,
            },
            other => other,
        }
    }
}

#[derive(Default)]
struct Script {
    replies: HashMap<(String, String), Reply>,
    calls: Vec<OutboundRequest>,
}

#[derive(Clone, Default)]
pub struct ScriptedHttpClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to `method url` with `reply` from now on. Unscripted calls get a 404.
    pub fn on(&self, method: &str, url: &str, reply: Reply) -> &Self {
        self.lock()
            .replies
            .insert((method.to_ascii_uppercase(), url.to_string()), reply);
        self
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<OutboundRequest> {
        self.lock().calls.clone()
    }

    pub fn count(&self, method: &str, url: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.method.eq_ignore_ascii_case(method) && c.url == url)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn send(&self, request: &OutboundRequest, timeout: Duration) -> Result<TaskResponse, CallError> {
        let reply = {
            let mut script = self.lock();
            script.calls.push(request.clone());
            script
                .replies
                .get(&(request.method.to_ascii_uppercase(), request.url.clone()))
                .cloned()
                .unwrap_or_else(|| Reply::status(404, ""))
        };

        match reply {
            Reply::Respond { status, body, delay } => {
                if delay > timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(CallError::Timeout);
                }
                tokio::time::sleep(delay).await;
                Ok(TaskResponse {
                    status_code: status,
                    headers: Headers::from([("content-length".to_string(), body.len().to_string())]),
                    body,
                })
            }
            Reply::Hang => {
                tokio::time::sleep(timeout).await;
                Err(CallError::Timeout)
            }
            Reply::Fail(reason) => Err(CallError::Transport(reason)),
        }
    }
}
