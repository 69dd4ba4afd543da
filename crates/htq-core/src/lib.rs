//! htq-core
//!
//! A broker for outbound HTTP calls: clients submit a call description, get a
//! task id back, and later ask for the status or the response. Workers pull
//! ids off a shared queue and perform the calls.
//!
//! # Modules
//! - **domain**: task ids, the status state machine, task and response records
//! - **ports**: the abstraction layer (BackingStore, HttpClient, Clock, IdGenerator)
//! - **store**: task/response records and the dispatch queue on top of a BackingStore
//! - **app**: the broker, workers, cancellation and the response waiter
//! - **impls**: in-memory and Redis stores, reqwest and scripted HTTP clients

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod store;

pub use app::{Broker, BrokerBuilder, BrokerConfig, CancelOutcome, Compensation, WorkerGroup};
pub use domain::{NewTask, Task, TaskId, TaskResponse, TaskResult, TaskStatus};
pub use error::{HtqError, Result};
