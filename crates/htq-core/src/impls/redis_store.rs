//! RedisStore - production backing store.
//!
//! Records are hashes and queues are lists. Plain commands go through a shared
//! `ConnectionManager`. `watch_and_commit` needs a connection of its own
//! because WATCH state is per connection, so it borrows a synchronous
//! connection from a small pool and runs WATCH / HGETALL / MULTI / EXEC on a
//! blocking thread. A connection that saw an error is dropped, not pooled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use crate::ports::{BackingStore, CommitOutcome, Decide, Fields, Mutation, StoreError};

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
            StoreError::Connection(e.to_string())
        } else {
            StoreError::Command(e.to_string())
        }
    }
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const IO_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_IDLE: usize = 8;

/// Idle synchronous connections for `watch_and_commit`.
#[derive(Clone)]
struct TxPool {
    client: redis::Client,
    idle: Arc<Mutex<Vec<redis::Connection>>>,
}

impl TxPool {
    fn new(client: redis::Client) -> Self {
        Self {
            client,
            idle: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn take(&self) -> Result<redis::Connection, StoreError> {
        let pooled = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        if let Some(con) = pooled {
            return Ok(con);
        }
        let con = self.client.get_connection_with_timeout(CONNECT_TIMEOUT)?;
        con.set_read_timeout(Some(IO_TIMEOUT))?;
        con.set_write_timeout(Some(IO_TIMEOUT))?;
        Ok(con)
    }

    fn give_back(&self, con: redis::Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE {
            idle.push(con);
        }
    }

    fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[derive(Clone)]
pub struct RedisStore {
    tx_pool: TxPool,
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect and check the server answers PING.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        info!(url, "connecting to redis");
        let client = redis::Client::open(url)?;
        let mut conn = client.get_connection_manager().await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self {
            tx_pool: TxPool::new(client),
            conn,
        })
    }

    /// Connections currently parked for conditional commits.
    pub fn idle_tx_connections(&self) -> usize {
        self.tx_pool.idle_count()
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn non_empty(record: HashMap<String, String>) -> Option<Fields> {
    // HGETALL answers an empty hash for a missing key.
    (!record.is_empty()).then_some(record)
}

fn hset(cmd: &mut redis::Cmd, key: &str, fields: &Fields) {
    cmd.arg(key);
    for (field, value) in fields {
        cmd.arg(field).arg(value);
    }
}

fn watch_and_commit_pooled(pool: &TxPool, key: &str, decide: Decide) -> Result<CommitOutcome, StoreError> {
    let mut con = pool.take()?;
    let outcome = watch_and_commit_blocking(&mut con, key, decide)?;
    pool.give_back(con);
    Ok(outcome)
}

fn watch_and_commit_blocking(
    con: &mut redis::Connection,
    key: &str,
    decide: Decide,
) -> Result<CommitOutcome, StoreError> {
    let _: () = redis::cmd("WATCH").arg(key).query(con)?;
    let current: HashMap<String, String> = redis::cmd("HGETALL").arg(key).query(con)?;

    let Some(mutations) = decide(non_empty(current).as_ref()) else {
        let _: () = redis::cmd("UNWATCH").query(con)?;
        return Ok(CommitOutcome::Declined);
    };

    let mut pipe = redis::pipe();
    pipe.atomic();
    for mutation in &mutations {
        match mutation {
            Mutation::SetFields { key, fields } => {
                let mut cmd = redis::cmd("HSET");
                hset(&mut cmd, key, fields);
                pipe.add_command(cmd).ignore();
            }
            Mutation::Delete { key } => {
                pipe.cmd("DEL").arg(key).ignore();
            }
        }
    }

    // EXEC answers nil when a watched key changed since WATCH.
    let result: Option<redis::Value> = pipe.query(con)?;
    Ok(match result {
        Some(_) => CommitOutcome::Committed,
        None => {
            debug!(key, "watched key changed, transaction aborted");
            CommitOutcome::Conflict
        }
    })
}

#[async_trait]
impl BackingStore for RedisStore {
    async fn get_record(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        let record: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut self.conn())
            .await?;
        Ok(non_empty(record))
    }

    async fn set_fields(&self, key: &str, fields: &Fields) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("HSET");
        hset(&mut cmd, key, fields);
        let _: i64 = cmd.query_async(&mut self.conn()).await?;
        Ok(())
    }

    async fn delete_record(&self, key: &str) -> Result<bool, StoreError> {
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.conn())
            .await?;
        Ok(removed > 0)
    }

    async fn push(&self, queue: &str, value: &str) -> Result<(), StoreError> {
        let _: i64 = redis::cmd("RPUSH")
            .arg(queue)
            .arg(value)
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>, StoreError> {
        let head: Option<String> = redis::cmd("LPOP")
            .arg(queue)
            .query_async(&mut self.conn())
            .await?;
        Ok(head)
    }

    async fn range(&self, queue: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let items: Vec<String> = redis::cmd("LRANGE")
            .arg(queue)
            .arg(start)
            .arg(stop)
            .query_async(&mut self.conn())
            .await?;
        Ok(items)
    }

    async fn len(&self, queue: &str) -> Result<usize, StoreError> {
        let len: usize = redis::cmd("LLEN")
            .arg(queue)
            .query_async(&mut self.conn())
            .await?;
        Ok(len)
    }

    async fn watch_and_commit(&self, key: &str, decide: Decide) -> Result<CommitOutcome, StoreError> {
        let pool = self.tx_pool.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || watch_and_commit_pooled(&pool, &key, decide))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}
