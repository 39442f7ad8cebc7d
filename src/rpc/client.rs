//! HTTP client for the PushGateway RPC surface.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::dto::{LogoutRequest, LogoutResponse, PushMessageRequest, PushMessageResponse};
use crate::domain::ChatMessage;
use crate::error::RpcError;

/// Something that can push a chat message to its recipients' live
/// connections.
#[async_trait]
pub trait MessagePusher: Send + Sync + 'static {
    /// Pushes `message` and returns the gateway's answer.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if the call did not complete successfully.
    async fn push_message(&self, message: &ChatMessage) -> Result<PushMessageResponse, RpcError>;
}

/// Client for a gateway's RPC server.
#[derive(Debug, Clone)]
pub struct PushGatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl PushGatewayClient {
    /// Creates a client for the server at `base_url` with a per-request
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Asks the gateway to close `user_id`'s connection.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] on transport failure or a non-success status.
    pub async fn logout(&self, user_id: &str) -> Result<LogoutResponse, RpcError> {
        self.call(
            "/rpc/v1/logout",
            &LogoutRequest {
                user_id: user_id.to_string(),
            },
        )
        .await
    }

    async fn call<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MessagePusher for PushGatewayClient {
    async fn push_message(&self, message: &ChatMessage) -> Result<PushMessageResponse, RpcError> {
        self.call("/rpc/v1/push-message", &PushMessageRequest::from(message))
            .await
    }
}
