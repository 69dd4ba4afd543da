//! BrokerBuilder - wiring and start-up validation.
//!
//! Only the backing store is mandatory. Everything else has a production
//! default that tests replace: reqwest for outbound calls, the system clock,
//! ULID ids.
//!
//! # Fail-fast
//! `build()` checks the configuration up front and reports every problem at
//! once instead of letting a zero poll interval or an empty key surface at
//! runtime.

use std::sync::Arc;

use super::broker::Broker;
use super::config::BrokerConfig;
use crate::impls::ReqwestHttpClient;
use crate::ports::{BackingStore, Clock, HttpClient, IdGenerator, SystemClock, UlidGenerator};
use crate::store::KeySpace;

/// Configuration problems found by [`BrokerBuilder::build`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid broker configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),
}

/// # Example
/// ```ignore
/// let broker = BrokerBuilder::new(Arc::new(RedisStore::connect(url).await?))
///     .config(settings.broker)
///     .keys(settings.keys)
///     .build()?;
/// ```
pub struct BrokerBuilder {
    store: Arc<dyn BackingStore>,
    keys: KeySpace,
    config: BrokerConfig,
    http: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl BrokerBuilder {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self {
            store,
            keys: KeySpace::default(),
            config: BrokerConfig::default(),
            http: None,
            clock: None,
            ids: None,
        }
    }

    pub fn keys(mut self, keys: KeySpace) -> Self {
        self.keys = keys;
        self
    }

    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Used for `created_at` and, unless an id generator is set, for ids.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.config.cancel_max_attempts == 0 {
            problems.push("cancel_max_attempts must be at least 1".to_string());
        }
        if self.config.wait_poll_interval_ms == 0 {
            problems.push("wait_poll_interval_ms must be at least 1".to_string());
        }
        if self.config.worker_idle_ms == 0 {
            problems.push("worker_idle_ms must be at least 1".to_string());
        }
        if self.config.default_timeout_secs == 0 {
            problems.push("default_timeout_secs must be at least 1".to_string());
        }
        for (name, value) in [
            ("keys.task_prefix", &self.keys.task_prefix),
            ("keys.response_prefix", &self.keys.response_prefix),
            ("keys.send_queue", &self.keys.send_queue),
        ] {
            if value.is_empty() {
                problems.push(format!("{name} must not be empty"));
            }
        }
        if self.keys.task_prefix == self.keys.response_prefix {
            problems.push("keys.task_prefix and keys.response_prefix must differ".to_string());
        }
        problems
    }

    pub fn build(self) -> Result<Broker, BuildError> {
        let problems = self.problems();
        if !problems.is_empty() {
            return Err(BuildError::InvalidConfig(problems));
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));

        Ok(Broker::new(self.store, self.keys, self.config, http, clock, ids))
    }
}
