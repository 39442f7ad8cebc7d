//! Event broker client: producer, consumer dispatcher and transports.
//!
//! Two seams keep the transport swappable:
//!
//! - [`EventPublisher`]: sends one [`BrokerEvent`] to its topic.
//! - [`TopicReader`]: polls one topic on behalf of a consumer group.
//!
//! [`NatsBroker`] implements both on top of NATS JetStream;
//! [`MemoryBroker`] implements both in-process for tests and single-process
//! runs.

pub mod backoff;
pub mod consumer;
pub mod memory;
pub mod nats;
pub mod producer;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::BrokerConfig;
use crate::domain::{BrokerEvent, Topic};
use crate::error::BrokerError;

pub use backoff::Backoff;
pub use consumer::{ConsumerDispatcher, ConsumerStats, DispatcherConfig, EventHandler, RunningDispatcher};
pub use memory::MemoryBroker;
pub use nats::NatsBroker;
pub use producer::EventProducer;

/// Sends events to the broker.
#[async_trait]
pub trait EventPublisher: Send + Sync + 'static {
    /// Publishes one event to `event.topic`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Publish`] if the broker did not accept it.
    async fn publish(&self, event: BrokerEvent) -> Result<(), BrokerError>;

    /// Flushes and releases the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Close`] if the flush failed.
    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Polls a single topic as a member of a consumer group.
///
/// Each message is delivered to exactly one reader of the group and is
/// acknowledged when it is returned from [`TopicReader::poll`].
#[async_trait]
pub trait TopicReader: Send + 'static {
    /// Topic this reader is subscribed to.
    fn topic(&self) -> Topic;

    /// Waits for the next event. `Ok(None)` means the reader is closed.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Poll`] on a transient transport failure.
    async fn poll(&mut self) -> Result<Option<BrokerEvent>, BrokerError>;

    /// Stops the reader and releases its subscription.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Close`] if the subscription could not be
    /// released cleanly.
    async fn close(&mut self) -> Result<(), BrokerError>;
}

/// A connected broker, selected by [`BrokerConfig::url`].
#[derive(Debug, Clone)]
pub enum Broker {
    /// NATS JetStream.
    Nats(NatsBroker),
    /// In-process queues.
    Memory(MemoryBroker),
}

impl Broker {
    /// Connects to the configured broker and provisions the stream for
    /// every [`Topic`].
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connect`] or [`BrokerError::Setup`]. Either is
    /// fatal at process startup.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        if config.is_memory() {
            tracing::info!("using in-process broker");
            return Ok(Self::Memory(MemoryBroker::default()));
        }
        let nats = NatsBroker::connect(config).await?;
        nats.ensure_stream().await?;
        Ok(Self::Nats(nats))
    }

    /// Returns a shareable publisher for this broker.
    #[must_use]
    pub fn publisher(&self) -> Arc<dyn EventPublisher> {
        match self {
            Self::Nats(nats) => Arc::new(nats.clone()),
            Self::Memory(memory) => Arc::new(memory.clone()),
        }
    }

    /// Creates one reader per topic for consumer group `group`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Setup`] if a durable consumer cannot be
    /// created.
    pub async fn readers(
        &self,
        topics: &[Topic],
        group: &str,
    ) -> Result<Vec<Box<dyn TopicReader>>, BrokerError> {
        let mut readers: Vec<Box<dyn TopicReader>> = Vec::with_capacity(topics.len());
        for &topic in topics {
            match self {
                Self::Nats(nats) => readers.push(Box::new(nats.reader(topic, group).await?)),
                Self::Memory(memory) => readers.push(Box::new(memory.reader(topic))),
            }
        }
        Ok(readers)
    }

    /// Flushes pending publishes and releases the connection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Close`] if the flush failed.
    pub async fn close(&self) -> Result<(), BrokerError> {
        match self {
            Self::Nats(nats) => nats.close().await,
            Self::Memory(memory) => {
                memory.close();
                Ok(())
            }
        }
    }
}
