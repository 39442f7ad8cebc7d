//! An admitted live connection and the transport seam it writes through.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use crate::error::ConnectionError;

/// Outbound half of a client transport.
///
/// Implemented for the WebSocket sink in [`crate::ws`]; tests plug in an
/// in-memory sink.
#[async_trait]
pub trait ClientSink: Send + 'static {
    /// Sends one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError>;

    /// Closes the transport.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Unique handle of one admitted connection.
///
/// Two sessions of the same identity always carry different ids, which is
/// what lets teardown tell a stale session from its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A live connection admitted under one identity.
///
/// Writes are serialized by a per-connection lock so a slow client only
/// stalls deliveries addressed to itself.
pub struct Connection {
    id: ConnectionId,
    identity: String,
    admitted_at: DateTime<Utc>,
    sink: Mutex<Box<dyn ClientSink>>,
    closed: CancellationToken,
}

impl Connection {
    /// Wraps an outbound sink admitted under `identity`.
    #[must_use]
    pub fn new(identity: impl Into<String>, sink: Box<dyn ClientSink>) -> Self {
        Self {
            id: ConnectionId::new(),
            identity: identity.into(),
            admitted_at: Utc::now(),
            sink: Mutex::new(sink),
            closed: CancellationToken::new(),
        }
    }

    /// Unique id of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Identity the connection was admitted under.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Admission time.
    #[must_use]
    pub fn admitted_at(&self) -> DateTime<Utc> {
        self.admitted_at
    }

    /// Sends a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Write`] if the connection was already
    /// shut down or the transport rejected the frame.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ConnectionError> {
        if self.closed.is_cancelled() {
            return Err(ConnectionError::Write("connection closed".to_string()));
        }
        self.sink.lock().await.send_text(text.into()).await
    }

    /// Sends `value` encoded as one JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Encode`] if `value` cannot be encoded,
    /// otherwise the same errors as [`Connection::send_text`].
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), ConnectionError> {
        let json = serde_json::to_string(value)?;
        self.send_text(json).await
    }

    /// Signals the session's read loop to stop and closes the transport.
    ///
    /// Idempotent at the signal level; the transport close is attempted on
    /// every call.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Close`] if the transport close failed.
    pub async fn shutdown(&self) -> Result<(), ConnectionError> {
        self.closed.cancel();
        self.sink.lock().await.close().await
    }

    /// Resolves once [`Connection::shutdown`] has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Returns `true` once [`Connection::shutdown`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("admitted_at", &self.admitted_at)
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}
