//! InMemoryStore - single-process backing store.
//!
//! All state sits behind one mutex, so every operation (including the whole
//! read-decide-write cycle of `watch_and_commit`) is trivially atomic. Used by
//! tests and by the CLI's `--memory` mode.
//!
//! Two switches simulate an unhealthy backend:
//! - `set_available(false)` makes every call fail with a connection error
//! - `inject_conflicts(n)` makes the next `n` conditional commits report a
//!   conflict without writing, as if another actor had touched the key

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::{BackingStore, CommitOutcome, Decide, Fields, Mutation, StoreError};

#[derive(Default)]
struct InMemoryState {
    records: HashMap<String, Fields>,
    lists: HashMap<String, VecDeque<String>>,
}

impl InMemoryState {
    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::SetFields { key, fields } => {
                self.records.entry(key).or_default().extend(fields);
            }
            Mutation::Delete { key } => {
                self.records.remove(&key);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InMemoryState>>,
    unavailable: Arc<AtomicBool>,
    pending_conflicts: Arc<AtomicU32>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn inject_conflicts(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("in-memory store switched off".to_string()));
        }
        Ok(())
    }

    fn take_injected_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Resolve Redis-style inclusive `start..=stop` (negative = from the tail)
/// against a list of `len` elements.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn get_record(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.records.get(key).cloned())
    }

    async fn set_fields(&self, key: &str, fields: &Fields) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.apply(Mutation::SetFields {
            key: key.to_string(),
            fields: fields.clone(),
        });
        Ok(())
    }

    async fn delete_record(&self, key: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.records.remove(key).is_some())
    }

    async fn push(&self, queue: &str, value: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state
            .lists
            .entry(queue.to_string())
            .or_default()
            .push_back(value.to_string());
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.lists.get_mut(queue).and_then(VecDeque::pop_front))
    }

    async fn range(&self, queue: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let Some(list) = state.lists.get(queue) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn len(&self, queue: &str) -> Result<usize, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.lists.get(queue).map_or(0, VecDeque::len))
    }

    async fn watch_and_commit(&self, key: &str, decide: Decide) -> Result<CommitOutcome, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(mutations) = decide(state.records.get(key)) else {
            return Ok(CommitOutcome::Declined);
        };
        if self.take_injected_conflict() {
            return Ok(CommitOutcome::Conflict);
        }
        for mutation in mutations {
            state.apply(mutation);
        }
        Ok(CommitOutcome::Committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn set_fields_merges_into_existing_record() {
        let store = InMemoryStore::new();
        store.set_fields("k", &fields(&[("a", "1"), ("b", "2")])).await.unwrap();
        store.set_fields("k", &fields(&[("b", "3")])).await.unwrap();

        let record = store.get_record("k").await.unwrap().unwrap();
        assert_eq!(record, fields(&[("a", "1"), ("b", "3")]));

        assert!(store.delete_record("k").await.unwrap());
        assert!(!store.delete_record("k").await.unwrap());
        assert_eq!(store.get_record("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_is_fifo() {
        let store = InMemoryStore::new();
        for v in ["a", "b", "c"] {
            store.push("q", v).await.unwrap();
        }
        assert_eq!(store.len("q").await.unwrap(), 3);
        assert_eq!(store.pop("q").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.pop("q").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.len("q").await.unwrap(), 1);
        assert_eq!(store.pop("q").await.unwrap().as_deref(), Some("c"));
        assert_eq!(store.pop("q").await.unwrap(), None);
    }

    #[rstest]
    #[case(0, -1, vec!["a", "b", "c", "d"])]
    #[case(1, 2, vec!["b", "c"])]
    #[case(-2, -1, vec!["c", "d"])]
    #[case(2, 100, vec!["c", "d"])]
    #[case(3, 1, vec![])]
    #[case(10, 20, vec![])]
    #[tokio::test]
    async fn range_follows_redis_semantics(
        #[case] start: isize,
        #[case] stop: isize,
        #[case] expected: Vec<&str>,
    ) {
        let store = InMemoryStore::new();
        for v in ["a", "b", "c", "d"] {
            store.push("q", v).await.unwrap();
        }
        assert_eq!(store.range("q", start, stop).await.unwrap(), expected);
        assert_eq!(store.len("q").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn concurrent_pops_never_share_an_element() {
        let store = InMemoryStore::new();
        for i in 0..100 {
            store.push("q", &i.to_string()).await.unwrap();
        }

        let mut joins = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            joins.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(v) = store.pop("q").await.unwrap() {
                    got.push(v);
                }
                got
            }));
        }

        let mut all = Vec::new();
        for j in joins {
            all.extend(j.await.unwrap());
        }
        all.sort_by_key(|v| v.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..100).map(|i| i.to_string()).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn commit_applies_all_mutations_or_none() {
        let store = InMemoryStore::new();
        store.set_fields("task", &fields(&[("status", "success")])).await.unwrap();
        store.set_fields("resp", &fields(&[("body", "x")])).await.unwrap();

        let outcome = store
            .watch_and_commit(
                "task",
                Box::new(|current| {
                    let current = current?;
                    (current.get("status").map(String::as_str) == Some("success")).then(|| {
                        vec![
                            Mutation::set_field("task", "status", "canceled"),
                            Mutation::delete("resp"),
                        ]
                    })
                }),
            )
            .await
            .unwrap();

        assert_eq!(outcome, CommitOutcome::Committed);
        assert_eq!(
            store.get_record("task").await.unwrap().unwrap()["status"],
            "canceled"
        );
        assert_eq!(store.get_record("resp").await.unwrap(), None);
    }

    #[tokio::test]
    async fn declined_and_conflicting_commits_write_nothing() {
        let store = InMemoryStore::new();

        let outcome = store
            .watch_and_commit("task", Box::new(|_| None))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Declined);

        store.inject_conflicts(1);
        let outcome = store
            .watch_and_commit(
                "task",
                Box::new(|_| Some(vec![Mutation::set_field("task", "status", "queued")])),
            )
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Conflict);
        assert_eq!(store.get_record("task").await.unwrap(), None);

        let outcome = store
            .watch_and_commit(
                "task",
                Box::new(|_| Some(vec![Mutation::set_field("task", "status", "queued")])),
            )
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.get_record("k").await,
            Err(StoreError::Connection(_))
        ));
        assert!(store.pop("q").await.is_err());

        store.set_available(true);
        assert!(store.pop("q").await.unwrap().is_none());
    }
}
