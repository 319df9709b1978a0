mod coordinator;
mod queue;

pub use coordinator::RefreshCoordinator;
pub use queue::{PendingQueue, QueueResult};
