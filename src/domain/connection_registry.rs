//! Live connection registry keyed by user identity.
//!
//! [`ConnectionRegistry`] stores every admitted [`Connection`] in a
//! `HashMap` behind one [`tokio::sync::RwLock`]. The map lock is only held
//! for lookups and mutations, never across a network write: each
//! connection serializes its own writes, so one slow client cannot stall
//! deliveries to everybody else.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::chat_message::ChatMessage;
use super::connection::{ClientSink, Connection};

/// Counts produced by one [`ConnectionRegistry::deliver`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients that received the payload.
    pub delivered: usize,
    /// Recipients with no live connection.
    pub missed: usize,
    /// Recipients whose write failed; their connection was evicted.
    pub failed: usize,
}

/// Result of a forced [`ConnectionRegistry::close`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// No connection was registered for the identity.
    NotConnected,
    /// The connection was closed and removed.
    Closed,
    /// The connection was removed but closing its transport failed.
    ClosedWithError(String),
}

impl CloseOutcome {
    /// Returns `true` if a connection existed and was removed.
    #[must_use]
    pub fn was_connected(&self) -> bool {
        !matches!(self, Self::NotConnected)
    }
}

/// Registry of admitted connections, at most one per identity.
///
/// # Concurrency
///
/// - Lookups take the read lock and clone the `Arc<Connection>` out.
/// - Admission, eviction and teardown take the write lock briefly.
/// - Writes to different connections proceed concurrently.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Admits a connection for `identity`.
    ///
    /// Any connection already registered for the same identity is removed
    /// and shut down before this returns.
    pub async fn register(
        &self,
        identity: impl Into<String>,
        sink: Box<dyn ClientSink>,
    ) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(identity, sink));
        let previous = self
            .connections
            .write()
            .await
            .insert(conn.identity().to_string(), Arc::clone(&conn));

        if let Some(previous) = previous {
            tracing::info!(
                user_id = %conn.identity(),
                evicted = %previous.id(),
                admitted = %conn.id(),
                "superseding existing connection"
            );
            if let Err(e) = previous.shutdown().await {
                tracing::warn!(user_id = %conn.identity(), error = %e, "failed to close superseded connection");
            }
        }

        conn
    }

    /// Writes `message.message` as JSON to every connected recipient.
    ///
    /// Offline recipients are logged and skipped. A failed write evicts
    /// that connection. Nothing is retried and no error is returned.
    pub async fn deliver(&self, message: &ChatMessage) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let payload = match serde_json::to_string(&message.message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(sender = %message.sender, error = %e, "failed to encode message body");
                return report;
            }
        };

        for recipient in message.unique_recipients() {
            let Some(conn) = self.get(recipient).await else {
                tracing::warn!(sender = %message.sender, recipient, "recipient not connected");
                report.missed += 1;
                continue;
            };

            match conn.send_text(payload.as_str()).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(recipient, error = %e, "write failed; evicting connection");
                    report.failed += 1;
                    self.unregister(&conn).await;
                    if let Err(e) = conn.shutdown().await {
                        tracing::debug!(recipient, error = %e, "close after failed write");
                    }
                }
            }
        }

        report
    }

    /// Forcibly removes and closes the connection for `identity`.
    ///
    /// The entry is removed even if closing the transport fails.
    pub async fn close(&self, identity: &str) -> CloseOutcome {
        let removed = self.connections.write().await.remove(identity);
        let Some(conn) = removed else {
            tracing::warn!(user_id = identity, "user not connected");
            return CloseOutcome::NotConnected;
        };

        match conn.shutdown().await {
            Ok(()) => {
                tracing::info!(user_id = identity, connection = %conn.id(), "connection closed");
                CloseOutcome::Closed
            }
            Err(e) => {
                tracing::error!(user_id = identity, error = %e, "error closing connection");
                CloseOutcome::ClosedWithError(e.to_string())
            }
        }
    }

    /// Removes `conn` if it is still the registered connection for its
    /// identity. Returns `true` if an entry was removed.
    ///
    /// Constant time. A teardown from a session that was already
    /// superseded leaves the successor in place.
    pub async fn unregister(&self, conn: &Connection) -> bool {
        let mut map = self.connections.write().await;
        if let Some(current) = map.get(conn.identity())
            && current.id() == conn.id()
        {
            map.remove(conn.identity());
            return true;
        }
        false
    }

    /// Removes and shuts down every connection. Used at process shutdown.
    ///
    /// Returns how many connections were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> = self
            .connections
            .write()
            .await
            .drain()
            .map(|(_, conn)| conn)
            .collect();

        for conn in &drained {
            if let Err(e) = conn.shutdown().await {
                tracing::debug!(user_id = %conn.identity(), error = %e, "close during shutdown");
            }
        }
        drained.len()
    }

    /// Returns the live connection for `identity`, if any.
    pub async fn get(&self, identity: &str) -> Option<Arc<Connection>> {
        self.connections.read().await.get(identity).cloned()
    }

    /// Returns `true` if `identity` has a live connection.
    pub async fn is_connected(&self, identity: &str) -> bool {
        self.connections.read().await.contains_key(identity)
    }

    /// Sorted list of connected identities.
    pub async fn identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of live connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
