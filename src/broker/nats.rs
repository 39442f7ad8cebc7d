//! NATS JetStream transport.
//!
//! All topics live in one stream (default `CHAT`) on subjects
//! `<prefix>.<topic>`. A consumer group maps to one durable pull consumer
//! per topic named `<group>-<topic>`: every worker process that binds the
//! same durable shares its messages, so each message reaches one reader.
//!
//! Messages are acknowledged as soon as they are pulled, before any
//! handler runs. Delivery is therefore at-most-once.

use std::fmt;
use std::time::Duration;

use async_nats::jetstream::consumer::pull::{self, Stream as MessageStream};
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy};
use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy};
use async_nats::jetstream::{self, Context as JetStreamContext};
use async_nats::{Client, ConnectOptions, HeaderMap};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;

use super::{EventPublisher, TopicReader};
use crate::config::BrokerConfig;
use crate::domain::{BrokerEvent, Topic};
use crate::error::BrokerError;

/// Header carrying the application-chosen event key.
pub const KEY_HEADER: &str = "Event-Key";

/// Header carrying the producer timestamp (RFC 3339).
pub const TIME_HEADER: &str = "Event-Time";

/// Connected JetStream client.
#[derive(Clone)]
pub struct NatsBroker {
    client: Client,
    jetstream: JetStreamContext,
    stream: String,
    subject_prefix: String,
}

impl NatsBroker {
    /// Connects to the NATS server at `config.url`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connect`] if the connection cannot be
    /// established within the configured timeout.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let options = ConnectOptions::new()
            .connection_timeout(config.connect_timeout())
            .name("notify-gateway");

        let client = async_nats::connect_with_options(config.url.as_str(), options)
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        let jetstream = jetstream::new(client.clone());

        tracing::info!(url = %config.url, stream = %config.stream, "connected to broker");

        Ok(Self {
            client,
            jetstream,
            stream: config.stream.clone(),
            subject_prefix: config.subject_prefix.clone(),
        })
    }

    /// Subject that `topic` is published on.
    #[must_use]
    pub fn subject(&self, topic: Topic) -> String {
        format!("{}.{}", self.subject_prefix, topic)
    }

    /// Creates the stream for all topics if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Setup`] if the stream cannot be created.
    pub async fn ensure_stream(&self) -> Result<(), BrokerError> {
        let config = StreamConfig {
            name: self.stream.clone(),
            subjects: Topic::ALL.iter().map(|&t| self.subject(t)).collect(),
            retention: RetentionPolicy::Limits,
            max_age: Duration::from_secs(24 * 60 * 60),
            ..Default::default()
        };

        self.jetstream
            .get_or_create_stream(config)
            .await
            .map_err(|e| BrokerError::Setup(e.to_string()))?;

        tracing::info!(stream = %self.stream, "stream ready");
        Ok(())
    }

    /// Binds the durable consumer `<group>-<topic>` and starts pulling.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Setup`] if the stream is missing or the
    /// consumer cannot be created.
    pub async fn reader(&self, topic: Topic, group: &str) -> Result<NatsTopicReader, BrokerError> {
        let setup = |e: &dyn fmt::Display| BrokerError::Setup(e.to_string());

        let stream = self
            .jetstream
            .get_stream(self.stream.as_str())
            .await
            .map_err(|e| setup(&e))?;

        let durable = format!("{group}-{topic}");
        let consumer = stream
            .get_or_create_consumer(
                durable.as_str(),
                pull::Config {
                    durable_name: Some(durable.clone()),
                    filter_subject: self.subject(topic),
                    deliver_policy: DeliverPolicy::All,
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| setup(&e))?;

        let messages = consumer.messages().await.map_err(|e| setup(&e))?;

        tracing::info!(%topic, consumer = %durable, "topic reader bound");
        Ok(NatsTopicReader {
            topic,
            messages: Some(messages),
        })
    }

    /// Flushes buffered publishes.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Close`] if the flush failed.
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.client
            .flush()
            .await
            .map_err(|e| BrokerError::Close(e.to_string()))
    }
}

impl fmt::Debug for NatsBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatsBroker")
            .field("stream", &self.stream)
            .field("subject_prefix", &self.subject_prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventPublisher for NatsBroker {
    async fn publish(&self, event: BrokerEvent) -> Result<(), BrokerError> {
        let topic = event.topic;
        let fail = |e: &dyn fmt::Display| BrokerError::Publish {
            topic: topic.to_string(),
            reason: e.to_string(),
        };

        let mut headers = HeaderMap::new();
        headers.insert(KEY_HEADER, event.key.as_str());
        headers.insert(TIME_HEADER, event.timestamp.to_rfc3339().as_str());

        let ack = self
            .jetstream
            .publish_with_headers(self.subject(topic), headers, event.payload.into())
            .await
            .map_err(|e| fail(&e))?;
        ack.await.map_err(|e| fail(&e))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        NatsBroker::close(self).await
    }
}

/// Pull-based reader over one durable consumer.
pub struct NatsTopicReader {
    topic: Topic,
    messages: Option<MessageStream>,
}

impl fmt::Debug for NatsTopicReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatsTopicReader")
            .field("topic", &self.topic)
            .field("open", &self.messages.is_some())
            .finish()
    }
}

#[async_trait]
impl TopicReader for NatsTopicReader {
    fn topic(&self) -> Topic {
        self.topic
    }

    async fn poll(&mut self) -> Result<Option<BrokerEvent>, BrokerError> {
        let Some(messages) = self.messages.as_mut() else {
            return Ok(None);
        };

        let message = match messages.next().await {
            None => return Ok(None),
            Some(Err(e)) => {
                return Err(BrokerError::Poll {
                    topic: self.topic.to_string(),
                    reason: e.to_string(),
                });
            }
            Some(Ok(message)) => message,
        };

        // Commit before the handler runs.
        if let Err(e) = message.ack().await {
            tracing::warn!(topic = %self.topic, error = %e, "failed to ack message");
        }

        let headers = message.message.headers.as_ref();
        let header = |name: &str| {
            headers
                .and_then(|h| h.get(name))
                .map(|v| v.as_str().to_string())
        };

        Ok(Some(BrokerEvent {
            topic: self.topic,
            key: header(KEY_HEADER).unwrap_or_default(),
            payload: message.message.payload.to_vec(),
            timestamp: header(TIME_HEADER)
                .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                .map_or_else(Utc::now, |t| t.with_timezone(&Utc)),
        }))
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.messages = None;
        Ok(())
    }
}
