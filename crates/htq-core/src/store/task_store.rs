//! TaskStore - canonical task and response records.
//!
//! Every status change that can race goes through
//! [`BackingStore::watch_and_commit`] with a check on the status the writer
//! expects to replace. A `false` return always means "someone else got there
//! first, re-read and decide again".

use std::sync::Arc;

use tracing::{debug, warn};

use super::keys::KeySpace;
use super::record::{self, STATUS};
use crate::domain::{Task, TaskId, TaskResponse, TaskStatus};
use crate::error::{HtqError, Result};
use crate::ports::{BackingStore, CommitOutcome, Fields, Mutation};

fn status_is(current: Option<&Fields>, expected: TaskStatus) -> bool {
    current.and_then(record::decode_status) == Some(expected)
}

#[derive(Clone)]
pub struct TaskStore {
    store: Arc<dyn BackingStore>,
    keys: KeySpace,
}

impl TaskStore {
    pub fn new(store: Arc<dyn BackingStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Persist a new task as `queued`. Fails with `AlreadyExists` if the id is taken.
    pub async fn create(&self, task: &Task) -> Result<()> {
        let key = self.keys.task_key(task.id);
        let mut fields = record::encode_task(task);
        fields.insert(STATUS.to_string(), TaskStatus::Queued.as_str().to_string());

        let write_key = key.clone();
        let outcome = self
            .store
            .watch_and_commit(
                &key,
                Box::new(move |current| {
                    current.is_none().then(|| {
                        vec![Mutation::SetFields {
                            key: write_key,
                            fields,
                        }]
                    })
                }),
            )
            .await?;

        match outcome {
            CommitOutcome::Committed => Ok(()),
            CommitOutcome::Declined | CommitOutcome::Conflict => Err(HtqError::AlreadyExists(task.id)),
        }
    }

    /// Load a task. Incomplete or corrupt records count as missing.
    pub async fn get(&self, id: TaskId) -> Result<Task> {
        let Some(fields) = self.store.get_record(&self.keys.task_key(id)).await? else {
            return Err(HtqError::NotFound(id));
        };
        record::decode_task(&fields).ok_or_else(|| {
            warn!(task_id = %id, "task record is incomplete or corrupt, treating as missing");
            HtqError::NotFound(id)
        })
    }

    /// Overwrite the status without any check.
    pub async fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<()> {
        let key = self.keys.task_key(id);
        let fields = Fields::from([(STATUS.to_string(), status.as_str().to_string())]);
        self.store.set_fields(&key, &fields).await?;
        Ok(())
    }

    /// Replace the status only if it is still `expected`.
    pub async fn set_status_if_unchanged(
        &self,
        id: TaskId,
        expected: TaskStatus,
        status: TaskStatus,
    ) -> Result<bool> {
        let key = self.keys.task_key(id);
        let write_key = key.clone();
        let outcome = self
            .store
            .watch_and_commit(
                &key,
                Box::new(move |current| {
                    status_is(current, expected)
                        .then(|| vec![Mutation::set_field(write_key, STATUS, status.as_str())])
                }),
            )
            .await?;

        if !outcome.is_committed() {
            debug!(task_id = %id, %expected, %status, ?outcome, "conditional status write lost");
        }
        Ok(outcome.is_committed())
    }

    /// Move a `pending` task to its terminal status, storing the response in
    /// the same commit. Returns false (and writes nothing) if the task is no
    /// longer `pending`.
    pub async fn complete(
        &self,
        id: TaskId,
        status: TaskStatus,
        response: Option<&TaskResponse>,
    ) -> Result<bool> {
        let key = self.keys.task_key(id);
        let mut mutations = Vec::with_capacity(2);
        if let Some(response) = response {
            mutations.push(Mutation::SetFields {
                key: self.keys.response_key(id),
                fields: record::encode_response(response),
            });
        }
        mutations.push(Mutation::set_field(key.clone(), STATUS, status.as_str()));

        let outcome = self
            .store
            .watch_and_commit(
                &key,
                Box::new(move |current| status_is(current, TaskStatus::Pending).then_some(mutations)),
            )
            .await?;
        Ok(outcome.is_committed())
    }

    /// Cancel a task that already finished: set `canceled` and drop its
    /// response in one commit, provided the status is still `observed`.
    pub async fn cancel_completed(&self, id: TaskId, observed: TaskStatus) -> Result<bool> {
        if !observed.is_completed() {
            return Ok(false);
        }
        let key = self.keys.task_key(id);
        let mutations = vec![
            Mutation::set_field(key.clone(), STATUS, TaskStatus::Canceled.as_str()),
            Mutation::delete(self.keys.response_key(id)),
        ];

        let outcome = self
            .store
            .watch_and_commit(
                &key,
                Box::new(move |current| status_is(current, observed).then_some(mutations)),
            )
            .await?;
        Ok(outcome.is_committed())
    }

    /// The stored response, if the task has one.
    pub async fn get_response(&self, id: TaskId) -> Result<Option<TaskResponse>> {
        let Some(fields) = self.store.get_record(&self.keys.response_key(id)).await? else {
            return Ok(None);
        };
        let response = record::decode_response(&fields);
        if response.is_none() {
            warn!(task_id = %id, "stored response is corrupt, ignoring it");
        }
        Ok(response)
    }

    /// Remove the task record. Returns whether there was one.
    pub async fn delete(&self, id: TaskId) -> Result<bool> {
        Ok(self.store.delete_record(&self.keys.task_key(id)).await?)
    }

    /// Remove the stored response. Returns whether there was one.
    pub async fn delete_response(&self, id: TaskId) -> Result<bool> {
        Ok(self.store.delete_record(&self.keys.response_key(id)).await?)
    }
}
