//! `GET /health` payload shared by the realtime and RPC servers.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::ConnectionRegistry;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process serves requests.
    pub status: String,
    /// RFC 3339 time of the check.
    pub timestamp: String,
    /// Crate version.
    pub version: String,
    /// Live connections in the registry.
    pub connections: usize,
}

impl HealthResponse {
    /// Builds a response reflecting `registry`'s current size.
    pub async fn snapshot(registry: &ConnectionRegistry) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connections: registry.len().await,
        }
    }
}
