//! DispatchQueue - FIFO of task ids waiting for a worker.
//!
//! The queue holds ids only; everything else lives in the task record. An id
//! whose task has since been canceled stays in the list until a worker pops
//! and skips it.

use std::sync::Arc;

use tracing::warn;

use crate::domain::TaskId;
use crate::error::Result;
use crate::ports::BackingStore;

#[derive(Clone)]
pub struct DispatchQueue {
    store: Arc<dyn BackingStore>,
    name: String,
}

impl DispatchQueue {
    pub fn new(store: Arc<dyn BackingStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append to the tail.
    pub async fn push(&self, id: TaskId) -> Result<()> {
        self.store.push(&self.name, &id.to_string()).await?;
        Ok(())
    }

    /// Remove and return the head. Each pushed id is handed out at most once.
    ///
    /// Entries that are not task ids are dropped with a warning and the next
    /// one is tried.
    pub async fn pop(&self) -> Result<Option<TaskId>> {
        while let Some(raw) = self.store.pop(&self.name).await? {
            match raw.parse() {
                Ok(id) => return Ok(Some(id)),
                Err(e) => warn!(queue = %self.name, error = %e, "dropping malformed queue entry"),
            }
        }
        Ok(None)
    }

    /// Ids from `start` to `stop` inclusive, without removing them.
    pub async fn range(&self, start: isize, stop: isize) -> Result<Vec<TaskId>> {
        let raw = self.store.range(&self.name, start, stop).await?;
        Ok(raw.iter().filter_map(|s| s.parse().ok()).collect())
    }

    /// Every id currently queued, head first, without removing anything.
    pub async fn list(&self) -> Result<Vec<TaskId>> {
        self.range(0, -1).await
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.len(&self.name).await?)
    }
}
