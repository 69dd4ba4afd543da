//! Ports - the abstraction layer.
//!
//! The traits the broker depends on. Each one hides an external system (the
//! Redis server, the remote HTTP endpoints) or a source of nondeterminism
//! (time, ids) so the core can be driven by in-memory fakes in tests.

pub mod backing_store;
pub mod clock;
pub mod http_client;
pub mod id_generator;

pub use self::backing_store::{BackingStore, CommitOutcome, Decide, Fields, Mutation, StoreError};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::http_client::{CallError, HttpClient, OutboundRequest};
pub use self::id_generator::{IdGenerator, UlidGenerator};
