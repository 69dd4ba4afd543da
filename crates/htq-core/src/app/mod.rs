//! App - the task lifecycle, built from the ports.
//!
//! # Components
//! - **BrokerBuilder**: wiring and fail-fast validation
//! - **Broker**: submit / status / cancel / await / listing
//! - **Worker / WorkerGroup**: pop → claim → call → complete
//! - **Canceller**: idempotent cancel with bounded optimistic retries
//! - **ResponseWaiter**: poll until a task is finished

pub mod broker;
pub mod builder;
pub mod cancel;
pub mod config;
pub mod waiter;
pub mod worker_loop;

pub use self::broker::Broker;
pub use self::builder::{BrokerBuilder, BuildError};
pub use self::cancel::{CancelOutcome, Canceller, Compensation};
pub use self::config::BrokerConfig;
pub use self::waiter::ResponseWaiter;
pub use self::worker_loop::{SkipReason, Worker, WorkerGroup, WorkerStep};
