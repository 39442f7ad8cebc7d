//! Shared queue between connection read loops and dispatch workers.

use tokio::sync::mpsc;

use crate::domain::ChatMessage;

/// Returned when a message is offered after the queue was closed for
/// shutdown. Carries the rejected message back to the caller.
#[derive(Debug, thiserror::Error)]
#[error("broadcast queue closed")]
pub struct QueueClosed(pub ChatMessage);

/// Sending half of the broadcast queue, cloned into every session.
///
/// Bounded: [`BroadcastQueue::enqueue`] waits while the queue is full, so
/// a slow broker slows down every connection's read loop.
#[derive(Debug, Clone)]
pub struct BroadcastQueue {
    sender: mpsc::Sender<ChatMessage>,
}

/// Receiving half, consumed by [`super::DispatchWorkerPool::start`].
#[derive(Debug)]
pub struct BroadcastReceiver {
    pub(crate) inner: mpsc::Receiver<ChatMessage>,
}

impl BroadcastQueue {
    /// Creates a queue holding at most `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, BroadcastReceiver) {
        let (sender, inner) = mpsc::channel(capacity.max(1));
        (Self { sender }, BroadcastReceiver { inner })
    }

    /// Adds a message, waiting for space if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] once shutdown has closed the queue.
    pub async fn enqueue(&self, message: ChatMessage) -> Result<(), QueueClosed> {
        self.sender
            .send(message)
            .await
            .map_err(|mpsc::error::SendError(message)| QueueClosed(message))
    }

    /// Number of messages currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Returns `true` if no message is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the queue no longer accepts messages.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
