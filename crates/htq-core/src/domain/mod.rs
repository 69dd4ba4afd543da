//! Domain model: task ids, the lifecycle state machine, task and response records.

pub mod ids;
pub mod response;
pub mod state;
pub mod task;

pub use ids::{ParseTaskIdError, TaskId};
pub use response::{TaskResponse, TaskResult};
pub use state::{ParseStatusError, TaskStatus};
pub use task::{DEFAULT_TIMEOUT_SECS, Headers, NewTask, Task};
