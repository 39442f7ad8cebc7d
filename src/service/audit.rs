//! Audit trail published to the broker's `logs` topic.
//!
//! Audit publishing is fire-and-log: a broker failure is reported through
//! `tracing` and never affects the session or RPC that produced it.

use std::net::SocketAddr;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::broker::EventProducer;

/// Key used for audit events that have no admitted identity.
pub const ANONYMOUS_KEY: &str = "Token";

/// One audit record as it appears on the `logs` topic.
///
/// ```json
/// {"message": "Client connected", "userId": "u-1", "remote_addr": "10.0.0.2:5123", "time": "2026-01-01T00:00:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    /// What happened.
    pub message: String,
    /// Identity the event concerns.
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Peer address of the transport, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    /// Error text for failure events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 timestamp.
    pub time: String,
}

impl AuditEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id: None,
            remote_addr: None,
            error: None,
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Attaches the identity the event concerns.
    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attaches the peer address, if known.
    #[must_use]
    pub fn remote_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.remote_addr = addr.map(|a| a.to_string());
        self
    }

    /// Attaches an error description.
    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    fn key(&self) -> &str {
        self.user_id.as_deref().unwrap_or(ANONYMOUS_KEY)
    }
}

/// Publishes [`AuditEvent`]s through an [`EventProducer`].
#[derive(Debug, Clone)]
pub struct AuditLog {
    producer: EventProducer,
}

impl AuditLog {
    /// Creates an audit log writing through `producer`.
    #[must_use]
    pub fn new(producer: EventProducer) -> Self {
        Self { producer }
    }

    /// Publishes `event` keyed by its user id. Failures are logged.
    pub async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.producer.send_log(event.key(), &event).await {
            tracing::error!(audit = %event.message, error = %e, "failed to send log event");
        }
    }

    /// A handshake presented a token that did not verify.
    ///
    /// The token itself is not recorded.
    pub async fn invalid_token(&self, reason: &str, remote_addr: Option<SocketAddr>) {
        self.record(
            AuditEvent::new("Invalid token")
                .remote_addr(remote_addr)
                .error(reason),
        )
        .await;
    }

    /// A connection was admitted.
    pub async fn client_connected(&self, user_id: &str, remote_addr: Option<SocketAddr>) {
        self.record(
            AuditEvent::new("Client connected")
                .user(user_id)
                .remote_addr(remote_addr),
        )
        .await;
    }

    /// A connection was closed on request.
    pub async fn connection_closed(&self, user_id: &str) {
        self.record(AuditEvent::new("WebSocket connection closed").user(user_id))
            .await;
    }

    /// Closing a connection's transport failed.
    pub async fn close_failed(&self, user_id: &str, error: &str) {
        self.record(
            AuditEvent::new("Error closing WebSocket connection")
                .user(user_id)
                .error(error),
        )
        .await;
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::broker::MemoryBroker;
    use crate::domain::Topic;

    fn audit() -> (AuditLog, MemoryBroker) {
        let broker = MemoryBroker::new(16);
        (
            AuditLog::new(EventProducer::new(Arc::new(broker.clone()))),
            broker,
        )
    }

    #[test]
    fn event_serializes_with_user_id_field() {
        let event = AuditEvent::new("Client connected").user("u-1");
        let Ok(value) = serde_json::to_value(&event) else {
            panic!("serializable");
        };
        assert_eq!(value["message"], "Client connected");
        assert_eq!(value["userId"], "u-1");
        assert!(value.get("error").is_none());
        assert!(value["time"].as_str().is_some_and(|t| t.ends_with('Z')));
    }

    #[tokio::test]
    async fn client_connected_is_keyed_by_user() {
        let (audit, broker) = audit();
        let addr: Option<SocketAddr> = "127.0.0.1:4000".parse().ok();
        audit.client_connected("u-1", addr).await;

        let events = broker.published();
        let [event] = events.as_slice() else {
            panic!("expected one event, got {events:?}");
        };
        assert_eq!(event.topic, Topic::Logs);
        assert_eq!(event.key, "u-1");
        assert!(event.payload_str().contains("127.0.0.1:4000"));
    }

    #[tokio::test]
    async fn invalid_token_uses_anonymous_key_and_omits_token() {
        let (audit, broker) = audit();
        audit.invalid_token("InvalidSignature", None).await;

        let events = broker.published();
        let [event] = events.as_slice() else {
            panic!("expected one event");
        };
        assert_eq!(event.key, ANONYMOUS_KEY);
        assert!(event.payload_str().contains("Invalid token"));
        assert!(!event.payload_str().contains("\"token\""));
    }

    #[tokio::test]
    async fn broker_failure_is_swallowed() {
        let (audit, broker) = audit();
        broker.set_available(false);
        audit.connection_closed("u-1").await;
        assert!(broker.published().is_empty());
    }
}
