//! Shared application state injected into the realtime endpoint.

use std::fmt;
use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::dispatch::BroadcastQueue;
use crate::domain::ConnectionRegistry;
use crate::service::AuditLog;

/// State available to the `/ws` handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Live connections, shared with the PushGateway RPC surface.
    pub registry: Arc<ConnectionRegistry>,
    /// Inbound chat messages waiting to be published.
    pub queue: BroadcastQueue,
    /// Admission token check.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Audit trail on the `logs` topic.
    pub audit: AuditLog,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .field("queue", &self.queue)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}
