//! Realtime channel wire format.

use serde::Deserialize;

use crate::domain::ChatMessage;
use crate::error::ProtocolError;

/// Text frame sent right after a connection is admitted.
pub const WELCOME_FRAME: &str = "Welcome back!";

/// Text frame sent before closing a connection whose token failed.
pub const INVALID_TOKEN_FRAME: &str = "Invalid token";

/// Query parameters of `GET /ws`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectParams {
    /// Bearer token; absent is treated like an invalid token.
    pub token: Option<String>,
}

/// Decodes one inbound frame as a [`ChatMessage`].
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] if the frame is not a JSON object
/// with `sender`, `recipients` and `message`.
pub fn decode_frame(bytes: &[u8]) -> Result<ChatMessage, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}
