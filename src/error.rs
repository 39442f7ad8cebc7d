//! Error taxonomy for the gateway and the worker.
//!
//! Only two conditions are fatal (listener bind, broker connect at
//! startup) and those surface through `anyhow` in the binaries. Every
//! other error type here is recovered locally and reported through logs.
//!
//! [`GatewayError`] is the one type that crosses an HTTP boundary and maps
//! to a status code plus structured JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid request: missing user_id",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Errors returned by the HTTP surfaces (WebSocket endpoint and RPC).
///
/// | Range     | Category   | HTTP Status               |
/// |-----------|------------|---------------------------|
/// | 1000–1999 | Validation | 400 / 426                 |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request to the realtime endpoint was not a protocol upgrade.
    #[error("upgrade required")]
    UpgradeRequired,

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::UpgradeRequired => 1002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Settings that are individually valid but cannot work together.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The worker was pointed at `memory://`. Its in-process queues are
    /// private to the worker, so no gateway can publish into them.
    #[error("the worker cannot consume from the in-process broker ({url}); set BROKER_URL to a NATS server")]
    InProcessBroker {
        /// Configured broker URL.
        url: String,
    },
}

/// Token admission failures. No registry entry is ever created for these.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// No `token` query parameter was supplied.
    #[error("missing token")]
    MissingToken,

    /// The token's `exp` claim is in the past.
    #[error("token expired")]
    Expired,

    /// Signature, format or claims check failed.
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Inbound frame problems. Ends the session's read loop as an ordinary
/// disconnect.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame was not a JSON chat message.
    #[error("malformed chat message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failures writing to or closing a client transport.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Sending a frame failed; the peer is treated as disconnected.
    #[error("write failed: {0}")]
    Write(String),

    /// Closing the transport failed.
    #[error("close failed: {0}")]
    Close(String),

    /// Payload could not be encoded as JSON.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Event broker failures on either the producer or consumer side.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Establishing the broker connection failed. Fatal at startup.
    #[error("broker connection failed: {0}")]
    Connect(String),

    /// Provisioning the stream or a durable consumer failed.
    #[error("broker setup failed: {0}")]
    Setup(String),

    /// A publish was not accepted by the broker.
    #[error("publish to {topic} failed: {reason}")]
    Publish {
        /// Topic the publish targeted.
        topic: String,
        /// Underlying failure.
        reason: String,
    },

    /// Polling a topic reader failed.
    #[error("poll on {topic} failed: {reason}")]
    Poll {
        /// Topic being polled.
        topic: String,
        /// Underlying failure.
        reason: String,
    },

    /// Closing a reader or writer during teardown failed.
    #[error("close failed: {0}")]
    Close(String),

    /// The payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// PushGateway RPC client failures.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The request could not be sent or the response not read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

/// Failures inside a consumer handler. Logged only: the broker has already
/// advanced past the message.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The event payload did not decode into the handler's message type.
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The PushGateway RPC call failed.
    #[error("push gateway call failed: {0}")]
    Rpc(#[from] RpcError),

    /// The log store rejected the write.
    #[error("log store failed: {0}")]
    Store(#[from] sqlx::Error),

    /// The email dispatcher failed.
    #[error("email dispatch failed: {0}")]
    Email(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_required_maps_to_426() {
        let err = GatewayError::UpgradeRequired;
        assert_eq!(err.status_code(), StatusCode::UPGRADE_REQUIRED);
        assert_eq!(err.error_code(), 1002);
        assert_eq!(err.to_string(), "upgrade required");
    }

    #[test]
    fn invalid_request_maps_to_400() {
        let err = GatewayError::InvalidRequest("missing user_id".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn broker_publish_error_names_topic() {
        let err = BrokerError::Publish {
            topic: "message".to_string(),
            reason: "no responders".to_string(),
        };
        assert_eq!(err.to_string(), "publish to message failed: no responders");
    }

    #[test]
    fn rpc_status_error_converts_into_handler_error() {
        let err: HandlerError = RpcError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "push gateway call failed: server returned 503: unavailable"
        );
    }
}
