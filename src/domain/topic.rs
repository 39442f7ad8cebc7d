//! Broker topics and the event envelope that travels on them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of broker topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Registration emails, keyed by email address.
    Email,
    /// Audit and application log events, keyed by user id.
    Logs,
    /// Chat messages, keyed by sender identity.
    Message,
}

impl Topic {
    /// Every topic, in subscription order.
    pub const ALL: [Self; 3] = [Self::Email, Self::Logs, Self::Message];

    /// Wire name of the topic.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Logs => "logs",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event on the broker: a JSON payload with a caller-chosen key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEvent {
    /// Topic the event was published to.
    pub topic: Topic,
    /// Application-chosen partitioning key.
    pub key: String,
    /// Serialized JSON payload.
    pub payload: Vec<u8>,
    /// Time the producer created the event.
    pub timestamp: DateTime<Utc>,
}

impl BrokerEvent {
    /// Serializes `value` as the JSON payload of a new event.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(
        topic: Topic,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            topic,
            key: key.into(),
            payload: serde_json::to_vec(value)?,
            timestamp: Utc::now(),
        })
    }

    /// Lossy UTF-8 view of the payload, for logging and the log store.
    #[must_use]
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn serde_names_match_display() {
        for topic in Topic::ALL {
            let Ok(encoded) = serde_json::to_string(&topic) else {
                panic!("serializable");
            };
            assert_eq!(encoded, format!("\"{topic}\""));
        }
    }

    #[test]
    fn json_event_carries_key_and_payload() {
        let Ok(event) = BrokerEvent::json(Topic::Logs, "u1", &serde_json::json!({"a": 1})) else {
            panic!("serializable");
        };
        assert_eq!(event.topic, Topic::Logs);
        assert_eq!(event.key, "u1");
        assert_eq!(event.payload_str(), r#"{"a":1}"#);
    }
}
