//! PushGateway: remote delivery and forced logout for live connections.

use std::sync::Arc;

use async_trait::async_trait;

use super::audit::AuditLog;
use crate::domain::{ChatMessage, CloseOutcome, ConnectionRegistry, DeliveryReport};
use crate::error::RpcError;
use crate::rpc::{MessagePusher, PushMessageResponse};

/// Result of [`PushGateway::push_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// Always `true`: offline recipients and failed writes are not errors.
    pub success: bool,
    /// Per-recipient counts.
    pub report: DeliveryReport,
}

/// Result of [`PushGateway::logout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutOutcome {
    /// Always `true`, even when nothing was connected.
    pub success: bool,
    /// What the registry did.
    pub close: CloseOutcome,
}

impl LogoutOutcome {
    /// Returns `true` if a connection existed for the identity.
    #[must_use]
    pub fn was_connected(&self) -> bool {
        self.close.was_connected()
    }
}

/// Operations peers invoke on the gateway over RPC.
#[derive(Debug, Clone)]
pub struct PushGateway {
    registry: Arc<ConnectionRegistry>,
    audit: AuditLog,
}

impl PushGateway {
    /// Creates a gateway over `registry`, auditing closes to `audit`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, audit: AuditLog) -> Self {
        Self { registry, audit }
    }

    /// The registry this gateway delivers through.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Writes `message.message` to every connected recipient.
    pub async fn push_message(&self, message: &ChatMessage) -> PushOutcome {
        let report = self.registry.deliver(message).await;
        tracing::info!(
            sender = %message.sender,
            delivered = report.delivered,
            missed = report.missed,
            failed = report.failed,
            "push message handled"
        );
        PushOutcome {
            success: true,
            report,
        }
    }

    /// Closes the connection of `user_id`, if any.
    pub async fn logout(&self, user_id: &str) -> LogoutOutcome {
        let close = self.registry.close(user_id).await;
        match &close {
            CloseOutcome::NotConnected => {}
            CloseOutcome::Closed => self.audit.connection_closed(user_id).await,
            CloseOutcome::ClosedWithError(e) => {
                self.audit.close_failed(user_id, e).await;
                self.audit.connection_closed(user_id).await;
            }
        }
        LogoutOutcome {
            success: true,
            close,
        }
    }
}

/// In-process pushing, used when the gateway consumes its own broker.
#[async_trait]
impl MessagePusher for PushGateway {
    async fn push_message(&self, message: &ChatMessage) -> Result<PushMessageResponse, RpcError> {
        let outcome = PushGateway::push_message(self, message).await;
        Ok(PushMessageResponse {
            success: outcome.success,
            delivered: outcome.report.delivered,
        })
    }
}
