//! Task Store and Dispatch Queue, both built on the [`BackingStore`](crate::ports::BackingStore) port.

pub mod dispatch_queue;
pub mod keys;
mod record;
pub mod task_store;

pub use self::dispatch_queue::DispatchQueue;
pub use self::keys::KeySpace;
pub use self::task_store::TaskStore;
