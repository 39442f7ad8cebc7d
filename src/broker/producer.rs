//! Typed per-topic publishing on top of an [`EventPublisher`].

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::EventPublisher;
use crate::domain::{BrokerEvent, Topic};
use crate::error::BrokerError;

/// Publishes JSON payloads to the `email`, `logs` and `message` topics.
///
/// Each call is one publish round trip. Callers log failures and move on;
/// nothing here retries, and no idempotency key is attached.
#[derive(Clone)]
pub struct EventProducer {
    publisher: Arc<dyn EventPublisher>,
}

impl EventProducer {
    /// Creates a producer writing through `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    /// Publishes `value` to the `email` topic under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] if serialization or the publish failed.
    pub async fn send_email<T>(&self, key: &str, value: &T) -> Result<(), BrokerError>
    where
        T: Serialize + ?Sized + Sync,
    {
        self.send(Topic::Email, key, value).await
    }

    /// Publishes `value` to the `logs` topic under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] if serialization or the publish failed.
    pub async fn send_log<T>(&self, key: &str, value: &T) -> Result<(), BrokerError>
    where
        T: Serialize + ?Sized + Sync,
    {
        self.send(Topic::Logs, key, value).await
    }

    /// Publishes `value` to the `message` topic under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] if serialization or the publish failed.
    pub async fn send_message<T>(&self, key: &str, value: &T) -> Result<(), BrokerError>
    where
        T: Serialize + ?Sized + Sync,
    {
        self.send(Topic::Message, key, value).await
    }

    /// Flushes and releases the underlying publisher.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Close`] if the flush failed.
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.publisher.close().await
    }

    async fn send<T>(&self, topic: Topic, key: &str, value: &T) -> Result<(), BrokerError>
    where
        T: Serialize + ?Sized + Sync,
    {
        let event = BrokerEvent::json(topic, key, value)?;
        self.publisher.publish(event).await?;
        tracing::debug!(%topic, key, "event published");
        Ok(())
    }
}

impl fmt::Debug for EventProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventProducer").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::domain::ChatMessage;

    #[tokio::test]
    async fn each_operation_targets_its_topic() {
        let broker = MemoryBroker::new(16);
        let producer = EventProducer::new(Arc::new(broker.clone()));

        assert!(producer.send_email("a@example.com", &serde_json::json!({"userID": "u1"})).await.is_ok());
        assert!(producer.send_log("u1", &serde_json::json!({"message": "hello"})).await.is_ok());
        assert!(producer.send_message("A", &ChatMessage::new("A", ["B"], "hi")).await.is_ok());

        let topics: Vec<Topic> = broker.published().into_iter().map(|e| e.topic).collect();
        assert_eq!(topics, vec![Topic::Email, Topic::Logs, Topic::Message]);
    }

    #[tokio::test]
    async fn message_is_keyed_and_json_encoded() {
        let broker = MemoryBroker::new(16);
        let producer = EventProducer::new(Arc::new(broker.clone()));
        let msg = ChatMessage::new("A", ["B"], "hi");

        assert!(producer.send_message(&msg.sender, &msg).await.is_ok());

        let Some(event) = broker.published().pop() else {
            panic!("one event expected");
        };
        assert_eq!(event.key, "A");
        let Ok(decoded) = serde_json::from_slice::<ChatMessage>(&event.payload) else {
            panic!("payload should decode");
        };
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn unavailable_broker_surfaces_publish_error() {
        let broker = MemoryBroker::new(16);
        broker.set_available(false);
        let producer = EventProducer::new(Arc::new(broker.clone()));

        let result = producer.send_log("u1", "x").await;
        assert!(matches!(result, Err(BrokerError::Publish { .. })));
        assert!(broker.published().is_empty());
    }
}
