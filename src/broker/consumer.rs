//! Multi-topic consumer dispatcher.
//!
//! ```text
//! TopicReader(email) ─┐
//! TopicReader(logs)  ─┼─► bounded job queue ─► N workers ─► handler[topic]
//! TopicReader(msg)   ─┘
//! ```
//!
//! Each reader runs its own polling task. Workers route every job to the
//! [`EventHandler`] registered for its topic; jobs for unregistered topics
//! are dropped. A handler error is logged and the job is gone: the reader
//! acknowledged it before it was queued.
//!
//! Shutdown order: cancel the pollers, let the job queue close once the
//! last poller exits, wait for workers to drain it, then close the readers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Backoff, TopicReader};
use crate::domain::{BrokerEvent, Topic};
use crate::error::HandlerError;

/// Processes events from one topic.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`]; the dispatcher logs it and moves on.
    async fn handle(&self, event: &BrokerEvent) -> Result<(), HandlerError>;
}

/// Sizing and retry settings for a [`ConsumerDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Capacity of the shared job queue.
    pub queue_capacity: usize,
    /// First delay after a poll error.
    pub backoff_initial: Duration,
    /// Maximum delay between poll retries.
    pub backoff_max: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 1000,
            backoff_initial: Duration::from_millis(100),
            backoff_max: Duration::from_secs(10),
        }
    }
}

/// Counters kept while the dispatcher runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Jobs whose handler returned `Ok`.
    pub handled: u64,
    /// Jobs whose handler returned an error.
    pub failed: u64,
    /// Jobs with no registered handler.
    pub ignored: u64,
    /// Poll errors seen across all readers.
    pub poll_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    handled: AtomicU64,
    failed: AtomicU64,
    ignored: AtomicU64,
    poll_errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            handled: self.handled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
        }
    }
}

type HandlerMap = HashMap<Topic, Arc<dyn EventHandler>>;

/// Routes events from several topic readers to per-topic handlers through
/// a bounded worker pool.
pub struct ConsumerDispatcher {
    config: DispatcherConfig,
    handlers: HandlerMap,
}

impl ConsumerDispatcher {
    /// Creates a dispatcher with no handlers.
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `topic`, replacing any previous one.
    pub fn register_handler(&mut self, topic: Topic, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(topic, handler);
    }

    /// Spawns one polling task per reader and the worker pool.
    ///
    /// Cancelling `shutdown` stops the pollers; use
    /// [`RunningDispatcher::shutdown`] to also drain and close.
    #[must_use]
    pub fn start(
        self,
        readers: Vec<Box<dyn TopicReader>>,
        shutdown: CancellationToken,
    ) -> RunningDispatcher {
        let (jobs_tx, jobs_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));
        let handlers = Arc::new(self.handlers);
        let counters = Arc::new(Counters::default());

        let workers = (0..self.config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&jobs_rx),
                    Arc::clone(&handlers),
                    Arc::clone(&counters),
                ))
            })
            .collect();

        let pollers = readers
            .into_iter()
            .map(|reader| {
                let backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_max);
                tokio::spawn(run_poller(
                    reader,
                    jobs_tx.clone(),
                    shutdown.clone(),
                    backoff,
                    Arc::clone(&counters),
                ))
            })
            .collect();

        // Pollers hold the only senders from here on.
        drop(jobs_tx);

        tracing::info!(workers = self.config.workers.max(1), "consumer dispatcher started");

        RunningDispatcher {
            shutdown,
            pollers,
            workers,
            counters,
        }
    }
}

impl fmt::Debug for ConsumerDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut topics: Vec<&Topic> = self.handlers.keys().collect();
        topics.sort();
        f.debug_struct("ConsumerDispatcher")
            .field("config", &self.config)
            .field("topics", &topics)
            .finish()
    }
}

/// Handle to a started [`ConsumerDispatcher`].
pub struct RunningDispatcher {
    shutdown: CancellationToken,
    pollers: Vec<JoinHandle<Box<dyn TopicReader>>>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl fmt::Debug for RunningDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningDispatcher")
            .field("pollers", &self.pollers.len())
            .field("workers", &self.workers.len())
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

impl RunningDispatcher {
    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> ConsumerStats {
        self.counters.snapshot()
    }

    /// Stops polling, drains queued jobs, then closes every reader.
    ///
    /// Reader close failures are logged; shutdown always completes.
    pub async fn shutdown(self) -> ConsumerStats {
        self.shutdown.cancel();

        let mut readers = Vec::with_capacity(self.pollers.len());
        for poller in self.pollers {
            match poller.await {
                Ok(reader) => readers.push(reader),
                Err(e) => tracing::error!(error = %e, "topic poller task failed"),
            }
        }

        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "consumer worker task failed");
            }
        }

        for mut reader in readers {
            if let Err(e) = reader.close().await {
                tracing::error!(topic = %reader.topic(), error = %e, "failed to close topic reader");
            }
        }

        let stats = self.counters.snapshot();
        tracing::info!(?stats, "consumer dispatcher stopped");
        stats
    }
}

async fn run_poller(
    mut reader: Box<dyn TopicReader>,
    jobs: mpsc::Sender<BrokerEvent>,
    shutdown: CancellationToken,
    mut backoff: Backoff,
    counters: Arc<Counters>,
) -> Box<dyn TopicReader> {
    let topic = reader.topic();
    tracing::debug!(%topic, "topic poller started");

    loop {
        let polled = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            polled = reader.poll() => polled,
        };

        match polled {
            Ok(Some(event)) => {
                backoff.reset();
                if jobs.send(event).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                tracing::info!(%topic, "topic reader closed");
                break;
            }
            Err(e) => {
                counters.poll_errors.fetch_add(1, Ordering::Relaxed);
                let delay = backoff.next_delay();
                tracing::warn!(
                    %topic,
                    error = %e,
                    attempt = backoff.attempt(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "poll failed; backing off"
                );
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    tracing::debug!(%topic, "topic poller stopped");
    reader
}

async fn run_worker(
    worker_id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<BrokerEvent>>>,
    handlers: Arc<HandlerMap>,
    counters: Arc<Counters>,
) {
    tracing::debug!(worker_id, "consumer worker started");

    loop {
        let job = jobs.lock().await.recv().await;
        let Some(event) = job else { break };

        let Some(handler) = handlers.get(&event.topic) else {
            counters.ignored.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(worker_id, topic = %event.topic, "no handler registered; ignoring");
            continue;
        };

        tracing::info!(worker_id, topic = %event.topic, key = %event.key, "processing event");
        match handler.handle(&event).await {
            Ok(()) => {
                counters.handled.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker_id, topic = %event.topic, error = %e, "error processing event");
            }
        }
    }

    tracing::debug!(worker_id, "consumer worker stopped");
}
