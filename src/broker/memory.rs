//! In-process broker.
//!
//! [`MemoryBroker`] keeps one unbounded queue per [`Topic`]. All readers of
//! a topic share that queue, so each event reaches exactly one reader, the
//! same distribution a single consumer group gets from a real broker. A
//! bounded history of everything published is kept for inspection.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use super::{EventPublisher, TopicReader};
use crate::domain::{BrokerEvent, Topic};
use crate::error::BrokerError;

#[derive(Debug)]
struct TopicQueue {
    sender: StdMutex<Option<mpsc::UnboundedSender<BrokerEvent>>>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<BrokerEvent>>>,
}

impl TopicQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: StdMutex::new(Some(tx)),
            receiver: Arc::new(Mutex::new(rx)),
        }
    }
}

#[derive(Debug)]
struct Inner {
    topics: HashMap<Topic, TopicQueue>,
    history: StdMutex<VecDeque<BrokerEvent>>,
    history_capacity: usize,
    available: AtomicBool,
}

/// In-process broker for tests and single-process runs.
///
/// Cheap to clone; clones share the same queues.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    /// Creates a broker keeping the last `history_capacity` published
    /// events for [`MemoryBroker::published`].
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        let topics = Topic::ALL.iter().map(|&t| (t, TopicQueue::new())).collect();
        Self {
            inner: Arc::new(Inner {
                topics,
                history: StdMutex::new(VecDeque::with_capacity(history_capacity.min(1024))),
                history_capacity,
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Creates a reader on `topic`. Readers of one topic share its queue.
    #[must_use]
    pub fn reader(&self, topic: Topic) -> MemoryReader {
        let receiver = self
            .inner
            .topics
            .get(&topic)
            .map(|q| Arc::clone(&q.receiver));
        MemoryReader {
            topic,
            receiver,
            broker: self.clone(),
        }
    }

    /// Snapshot of the retained publish history, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<BrokerEvent> {
        self.inner
            .history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Simulates an outage: while unavailable, publishes and polls fail.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Closes every topic queue. Readers drain what is queued, then see
    /// end-of-stream.
    pub fn close(&self) {
        for queue in self.inner.topics.values() {
            if let Ok(mut sender) = queue.sender.lock() {
                sender.take();
            }
        }
    }

    fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    fn record(&self, event: &BrokerEvent) {
        if self.inner.history_capacity == 0 {
            return;
        }
        if let Ok(mut history) = self.inner.history.lock() {
            if history.len() == self.inner.history_capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl EventPublisher for MemoryBroker {
    async fn publish(&self, event: BrokerEvent) -> Result<(), BrokerError> {
        let topic = event.topic;
        let fail = |reason: &str| BrokerError::Publish {
            topic: topic.to_string(),
            reason: reason.to_string(),
        };
        if !self.is_available() {
            return Err(fail("broker unavailable"));
        }

        let queue = self.inner.topics.get(&topic).ok_or_else(|| fail("unknown topic"))?;
        let sender = queue
            .sender
            .lock()
            .map_err(|_| fail("queue poisoned"))?
            .clone()
            .ok_or_else(|| fail("broker closed"))?;

        self.record(&event);
        sender.send(event).map_err(|_| fail("broker closed"))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        MemoryBroker::close(self);
        Ok(())
    }
}

/// Reader over one [`MemoryBroker`] topic queue.
#[derive(Debug)]
pub struct MemoryReader {
    topic: Topic,
    receiver: Option<Arc<Mutex<mpsc::UnboundedReceiver<BrokerEvent>>>>,
    broker: MemoryBroker,
}

#[async_trait]
impl TopicReader for MemoryReader {
    fn topic(&self) -> Topic {
        self.topic
    }

    async fn poll(&mut self) -> Result<Option<BrokerEvent>, BrokerError> {
        if !self.broker.is_available() {
            return Err(BrokerError::Poll {
                topic: self.topic.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }
        let Some(receiver) = &self.receiver else {
            return Ok(None);
        };
        Ok(receiver.lock().await.recv().await)
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.receiver = None;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn event(topic: Topic, key: &str) -> BrokerEvent {
        let Ok(event) = BrokerEvent::json(topic, key, &serde_json::json!({"k": key})) else {
            panic!("serializable");
        };
        event
    }

    #[tokio::test]
    async fn reader_receives_only_its_topic() {
        let broker = MemoryBroker::new(100);
        let mut logs = broker.reader(Topic::Logs);

        assert!(broker.publish(event(Topic::Message, "m")).await.is_ok());
        assert!(broker.publish(event(Topic::Logs, "l")).await.is_ok());

        let Ok(Some(received)) = logs.poll().await else {
            panic!("expected a logs event");
        };
        assert_eq!(received.key, "l");
    }

    #[tokio::test]
    async fn readers_of_one_topic_share_events() {
        let broker = MemoryBroker::new(100);
        let mut r1 = broker.reader(Topic::Message);
        let mut r2 = broker.reader(Topic::Message);

        assert!(broker.publish(event(Topic::Message, "1")).await.is_ok());
        assert!(broker.publish(event(Topic::Message, "2")).await.is_ok());

        let Ok(Some(a)) = r1.poll().await else {
            panic!("r1 should get one event");
        };
        let Ok(Some(b)) = r2.poll().await else {
            panic!("r2 should get the other event");
        };
        assert_ne!(a.key, b.key);
    }

    #[tokio::test]
    async fn close_drains_then_ends_stream() {
        let broker = MemoryBroker::new(100);
        let mut reader = broker.reader(Topic::Email);
        assert!(broker.publish(event(Topic::Email, "e")).await.is_ok());

        broker.close();

        assert!(matches!(reader.poll().await, Ok(Some(_))));
        assert!(matches!(reader.poll().await, Ok(None)));
        assert!(broker.publish(event(Topic::Email, "late")).await.is_err());
    }

    #[test]
    fn history_is_bounded() {
        let broker = MemoryBroker::new(2);
        for key in ["1", "2", "3"] {
            broker.record(&event(Topic::Logs, key));
        }
        let keys: Vec<String> = broker.published().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["2".to_string(), "3".to_string()]);
    }

    #[tokio::test]
    async fn outage_fails_publish_and_poll() {
        let broker = MemoryBroker::new(10);
        let mut reader = broker.reader(Topic::Logs);
        broker.set_available(false);

        assert!(broker.publish(event(Topic::Logs, "x")).await.is_err());
        assert!(matches!(reader.poll().await, Err(BrokerError::Poll { .. })));
    }
}
