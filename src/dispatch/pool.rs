//! Fixed-size pool publishing queued chat messages to the broker.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::queue::BroadcastReceiver;
use crate::broker::EventProducer;
use crate::domain::ChatMessage;

/// Publish counters for a [`DispatchWorkerPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages the broker accepted.
    pub published: u64,
    /// Messages dropped because the publish failed.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Workers draining the broadcast queue into the `message` topic.
///
/// Each message is published once, keyed by its sender. A failed publish
/// is logged and the message dropped.
pub struct DispatchWorkerPool {
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl DispatchWorkerPool {
    /// Spawns `workers` tasks consuming `receiver`.
    ///
    /// Cancelling `shutdown` (or calling [`Self::shutdown`]) closes the
    /// queue; workers then publish whatever is still buffered and exit.
    #[must_use]
    pub fn start(
        receiver: BroadcastReceiver,
        producer: EventProducer,
        workers: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver.inner));
        let counters = Arc::new(Counters::default());

        let workers = (0..workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&receiver),
                    producer.clone(),
                    shutdown.clone(),
                    Arc::clone(&counters),
                ))
            })
            .collect::<Vec<_>>();

        tracing::info!(workers = workers.len(), "dispatch worker pool started");

        Self {
            shutdown,
            workers,
            counters,
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Closes the queue to new messages, publishes everything already
    /// queued, and waits for every worker to exit.
    pub async fn shutdown(self) -> DispatchStats {
        self.shutdown.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "dispatch worker task failed");
            }
        }
        let stats = self.counters.snapshot();
        tracing::info!(?stats, "dispatch worker pool stopped");
        stats
    }
}

impl fmt::Debug for DispatchWorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchWorkerPool")
            .field("workers", &self.workers.len())
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<ChatMessage>>>,
    producer: EventProducer,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
) {
    loop {
        let next = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                msg = rx.recv() => msg,
                () = shutdown.cancelled() => {
                    // Stop accepting; buffered messages are still returned.
                    rx.close();
                    rx.recv().await
                }
            }
        };
        let Some(msg) = next else { break };

        tracing::debug!(worker_id, sender = %msg.sender, recipients = ?msg.recipients, "dispatching message");
        match producer.send_message(&msg.sender, &msg).await {
            Ok(()) => {
                counters.published.fetch_add(1, Ordering::Relaxed);
                tracing::info!(worker_id, sender = %msg.sender, "message pushed to broker");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker_id, sender = %msg.sender, error = %e, "error publishing message");
            }
        }
    }

    tracing::debug!(worker_id, "dispatch worker stopped");
}
