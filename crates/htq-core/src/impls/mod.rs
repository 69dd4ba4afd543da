//! Impls - port implementations.
//!
//! - **InMemoryStore**: single-process backing store (tests, `--memory` demos)
//! - **RedisStore**: production backing store
//! - **ReqwestHttpClient**: outbound HTTP calls
//! - **ScriptedHttpClient**: canned replies for tests

pub mod memory_store;
pub mod redis_store;
pub mod reqwest_client;
pub mod scripted_client;

pub use self::memory_store::InMemoryStore;
pub use self::redis_store::RedisStore;
pub use self::reqwest_client::ReqwestHttpClient;
pub use self::scripted_client::{Reply, ScriptedHttpClient};
