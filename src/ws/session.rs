//! Per-connection session: admission handshake, read loop, teardown.
//!
//! ```text
//! Connecting ─► Validating ─► Admitted ─► Active ─► Closing ─► Closed
//!                   │             │                    ▲
//!                   └─────────────┴────────────────────┘
//! ```
//!
//! A failed token check goes straight to `Closing` without ever touching
//! the registry. An admitted session leaves `Active` when the peer
//! disconnects, sends a frame that is not a chat message, or is evicted
//! by a newer session of the same identity.

use std::fmt;
use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Stream, StreamExt};

use super::messages::{INVALID_TOKEN_FRAME, WELCOME_FRAME, decode_frame};
use crate::app_state::AppState;
use crate::domain::ClientSink;
use crate::error::{AdmissionError, ProtocolError};

/// Lifecycle phase of one realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Upgrade accepted, nothing checked yet.
    Connecting,
    /// Verifying the bearer token.
    Validating,
    /// Registered under its identity and greeted.
    Admitted,
    /// Reading chat messages.
    Active,
    /// Tearing down.
    Closing,
    /// Done.
    Closed,
}

/// Attempted a transition the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal session transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    /// Current phase.
    pub from: SessionState,
    /// Requested phase.
    pub to: SessionState,
}

impl SessionState {
    /// Returns `true` if `next` may follow `self`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Validating)
                | (Self::Validating, Self::Admitted | Self::Closing)
                | (Self::Admitted, Self::Active | Self::Closing)
                | (Self::Active, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if `next` may not follow `self`.
    pub fn advance(&mut self, next: Self) -> Result<(), InvalidTransition> {
        if !self.can_advance_to(next) {
            return Err(InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The token did not verify; the session was never admitted.
    Rejected(AdmissionError),
    /// The peer closed the connection or the stream ended.
    PeerClosed,
    /// The peer sent a frame that is not a chat message.
    Protocol(ProtocolError),
    /// Reading from the transport failed.
    ReadFailed(String),
    /// The greeting could not be written.
    GreetingFailed,
    /// A newer session of the same identity, or a logout, closed this one.
    Evicted,
    /// The broadcast queue was closed for shutdown.
    QueueClosed,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(e) => write!(f, "rejected: {e}"),
            Self::PeerClosed => f.write_str("peer closed"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::ReadFailed(e) => write!(f, "read failed: {e}"),
            Self::GreetingFailed => f.write_str("greeting failed"),
            Self::Evicted => f.write_str("evicted"),
            Self::QueueClosed => f.write_str("queue closed"),
        }
    }
}

/// Summary returned when a session finishes.
#[derive(Debug)]
pub struct SessionReport {
    /// Identity the session was admitted under, if it was admitted.
    pub identity: Option<String>,
    /// Chat messages handed to the broadcast queue.
    pub forwarded: usize,
    /// Why the session ended.
    pub end: SessionEnd,
    /// Final lifecycle phase.
    pub state: SessionState,
}

/// Drives an upgraded WebSocket until it closes.
pub async fn run_session(
    socket: WebSocket,
    state: AppState,
    token: Option<String>,
    remote_addr: Option<SocketAddr>,
) {
    let (sink, stream) = socket.split();
    let report = drive(Box::new(sink), stream, &state, token.as_deref(), remote_addr).await;
    tracing::info!(
        user_id = report.identity.as_deref().unwrap_or("-"),
        remote_addr = ?remote_addr,
        forwarded = report.forwarded,
        reason = %report.end,
        "client disconnected"
    );
}

enum Next<T> {
    Evicted,
    Frame(Option<T>),
}

/// Runs the session over any transport split into a [`ClientSink`] and a
/// stream of inbound frames.
pub(crate) async fn drive<St, E>(
    mut sink: Box<dyn ClientSink>,
    mut stream: St,
    state: &AppState,
    token: Option<&str>,
    remote_addr: Option<SocketAddr>,
) -> SessionReport
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let mut phase = SessionState::Connecting;
    transition(&mut phase, SessionState::Validating);

    let claims = match state.verifier.verify(token.unwrap_or_default()) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(remote_addr = ?remote_addr, error = %e, "invalid token");
            if let Err(we) = sink.send_text(INVALID_TOKEN_FRAME.to_string()).await {
                tracing::debug!(error = %we, "failed to send invalid token frame");
            }
            if let Err(ce) = sink.close().await {
                tracing::debug!(error = %ce, "failed to close rejected connection");
            }
            state.audit.invalid_token(&e.to_string(), remote_addr).await;
            transition(&mut phase, SessionState::Closing);
            transition(&mut phase, SessionState::Closed);
            return SessionReport {
                identity: None,
                forwarded: 0,
                end: SessionEnd::Rejected(e),
                state: phase,
            };
        }
    };

    let identity = claims.sub;
    tracing::info!(user_id = %identity, remote_addr = ?remote_addr, "client connected");
    state.audit.client_connected(&identity, remote_addr).await;

    let conn = state.registry.register(identity.as_str(), sink).await;
    transition(&mut phase, SessionState::Admitted);

    let mut forwarded = 0_usize;
    let end = if let Err(e) = conn.send_text(WELCOME_FRAME).await {
        tracing::warn!(user_id = %identity, error = %e, "failed to send welcome frame");
        SessionEnd::GreetingFailed
    } else {
        transition(&mut phase, SessionState::Active);
        loop {
            let next = tokio::select! {
                biased;
                () = conn.closed() => Next::Evicted,
                frame = stream.next() => Next::Frame(frame),
            };

            let bytes = match next {
                Next::Evicted => break SessionEnd::Evicted,
                Next::Frame(None) | Next::Frame(Some(Ok(Message::Close(_)))) => {
                    break SessionEnd::PeerClosed;
                }
                Next::Frame(Some(Err(e))) => break SessionEnd::ReadFailed(e.to_string()),
                Next::Frame(Some(Ok(Message::Text(text)))) => text.as_str().as_bytes().to_vec(),
                Next::Frame(Some(Ok(Message::Binary(data)))) => data.to_vec(),
                Next::Frame(Some(Ok(_))) => continue,
            };

            let mut msg = match decode_frame(&bytes) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!(user_id = %identity, error = %e, "error reading message");
                    break SessionEnd::Protocol(e);
                }
            };

            if msg.sender != identity {
                tracing::warn!(
                    user_id = %identity,
                    claimed = %msg.sender,
                    "sender does not match admitted identity; overriding"
                );
                msg.sender.clone_from(&identity);
            }

            tracing::info!(
                sender = %msg.sender,
                recipients = ?msg.recipients,
                "message received"
            );
            if state.queue.enqueue(msg).await.is_err() {
                break SessionEnd::QueueClosed;
            }
            forwarded += 1;
        }
    };

    transition(&mut phase, SessionState::Closing);
    let removed = state.registry.unregister(&conn).await;
    if let Err(e) = conn.shutdown().await {
        tracing::debug!(user_id = %identity, error = %e, "transport already closed");
    }
    transition(&mut phase, SessionState::Closed);
    tracing::debug!(user_id = %identity, connection = %conn.id(), removed, "session torn down");

    SessionReport {
        identity: Some(identity),
        forwarded,
        end,
        state: phase,
    }
}

fn transition(phase: &mut SessionState, next: SessionState) {
    if let Err(e) = phase.advance(next) {
        tracing::error!(error = %e, "session state machine violated");
    }
}
