//! Inbound path: connections enqueue chat messages, a worker pool
//! publishes them to the broker's `message` topic.

pub mod pool;
pub mod queue;

pub use pool::{DispatchStats, DispatchWorkerPool};
pub use queue::{BroadcastQueue, BroadcastReceiver, QueueClosed};
