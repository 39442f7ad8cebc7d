//! Request and response bodies of the PushGateway RPC surface.

use serde::{Deserialize, Serialize};

use crate::domain::ChatMessage;

/// `POST /rpc/v1/push-message` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessageRequest {
    /// Originating user.
    pub sender: String,
    /// Users to deliver to.
    pub recipients: Vec<String>,
    /// Message body.
    pub message: String,
}

impl From<PushMessageRequest> for ChatMessage {
    fn from(req: PushMessageRequest) -> Self {
        Self {
            sender: req.sender,
            recipients: req.recipients,
            message: req.message,
        }
    }
}

impl From<&ChatMessage> for PushMessageRequest {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            sender: msg.sender.clone(),
            recipients: msg.recipients.clone(),
            message: msg.message.clone(),
        }
    }
}

/// `POST /rpc/v1/push-message` response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessageResponse {
    /// Always `true`.
    pub success: bool,
    /// Recipients the body was written to.
    pub delivered: usize,
}

/// `POST /rpc/v1/logout` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutRequest {
    /// Identity to disconnect.
    pub user_id: String,
}

/// `POST /rpc/v1/logout` response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Always `true`.
    pub success: bool,
    /// Whether a connection existed and was closed.
    pub was_connected: bool,
}
