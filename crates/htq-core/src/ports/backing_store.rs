//! BackingStore port - the primitive key/list store everything else is built on.
//!
//! Records are flat string maps (a Redis hash in production) and queues are
//! lists of strings. The only coordination primitives are the atomic head pop
//! and [`BackingStore::watch_and_commit`]; the broker never takes a lock of
//! its own.
//!
//! # Implementations
//! - `InMemoryStore`: single-process store for tests and demos
//! - `RedisStore`: WATCH / MULTI / EXEC against a Redis server

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Field map of one record.
pub type Fields = HashMap<String, String>;

/// One write inside a conditional commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Set (insert or overwrite) the given fields of a record.
    SetFields { key: String, fields: Fields },
    /// Remove a record entirely.
    Delete { key: String },
}

impl Mutation {
    pub fn set_field(key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        let mut fields = Fields::new();
        fields.insert(field.into(), value.into());
        Mutation::SetFields {
            key: key.into(),
            fields,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Mutation::Delete { key: key.into() }
    }
}

/// Inspects the watched record (`None` when absent) and returns the writes to
/// commit, or `None` to leave everything untouched.
pub type Decide = Box<dyn FnOnce(Option<&Fields>) -> Option<Vec<Mutation>> + Send>;

/// Result of [`BackingStore::watch_and_commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The writes were applied atomically.
    Committed,
    /// The decide callback declined to write.
    Declined,
    /// Another actor modified the watched key before the commit; nothing was written.
    Conflict,
}

impl CommitOutcome {
    pub fn is_committed(self) -> bool {
        matches!(self, CommitOutcome::Committed)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("background task failed: {0}")]
    Join(String),
}

/// Backing store contract.
///
/// # Guarantees required from implementations
/// - `pop` removes and returns the head atomically: two concurrent callers
///   never receive the same element.
/// - `watch_and_commit` applies its mutations all-or-nothing, and only if the
///   watched key was not modified between the read handed to `decide` and the
///   commit.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Read a whole record; `None` when the key does not exist.
    async fn get_record(&self, key: &str) -> Result<Option<Fields>, StoreError>;

    /// Set the given fields of a record, creating it if needed.
    async fn set_fields(&self, key: &str, fields: &Fields) -> Result<(), StoreError>;

    /// Delete a record. Returns whether something was deleted.
    async fn delete_record(&self, key: &str) -> Result<bool, StoreError>;

    /// Append to the tail of a list.
    async fn push(&self, queue: &str, value: &str) -> Result<(), StoreError>;

    /// Atomically remove and return the head of a list.
    async fn pop(&self, queue: &str) -> Result<Option<String>, StoreError>;

    /// Read list elements `start..=stop` without consuming them. Negative
    /// indexes count from the tail, `-1` being the last element.
    async fn range(&self, queue: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError>;

    /// Number of elements in a list.
    async fn len(&self, queue: &str) -> Result<usize, StoreError>;

    /// Read `key` under watch, let `decide` choose the writes, and commit them
    /// only if `key` is still unchanged.
    async fn watch_and_commit(&self, key: &str, decide: Decide) -> Result<CommitOutcome, StoreError>;
}
