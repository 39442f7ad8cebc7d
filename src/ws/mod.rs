//! Realtime endpoint: WebSocket upgrade, admission and per-connection
//! sessions.
//!
//! Clients connect to `/ws?token=<jwt>`, receive `Welcome back!`, then
//! send JSON chat messages which are queued for publication. Deliveries
//! arrive as JSON string frames pushed through the PushGateway.
//!
//! The `sender` field of an inbound message is not trusted: it is always
//! replaced with the identity the connection was admitted under before
//! the message is published. A mismatch is logged at `warn`.

pub mod handler;
pub mod messages;
pub mod session;
mod sink;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::health::HealthResponse;

/// `GET /health`: Realtime server health.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse::snapshot(&state.registry).await)
}

/// Router for the realtime server: `/ws` and `/health`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(handler::ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::JwtVerifier;
    use crate::broker::{EventProducer, MemoryBroker};
    use crate::dispatch::BroadcastQueue;
    use crate::domain::ConnectionRegistry;
    use crate::service::AuditLog;

    fn state() -> AppState {
        let (queue, _receiver) = BroadcastQueue::new(4);
        AppState {
            registry: Arc::new(ConnectionRegistry::new()),
            queue,
            verifier: Arc::new(JwtVerifier::new(b"secret-key")),
            audit: AuditLog::new(EventProducer::new(Arc::new(MemoryBroker::new(8)))),
        }
    }

    #[tokio::test]
    async fn plain_get_on_ws_is_426() {
        let Ok(request) = Request::builder().uri("/ws?token=abc").body(Body::empty()) else {
            panic!("request");
        };
        let Ok(response) = router(state()).oneshot(request).await else {
            panic!("infallible");
        };
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);

        let Ok(bytes) = axum::body::to_bytes(response.into_body(), 4096).await else {
            panic!("body");
        };
        let Ok(body) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            panic!("json error body");
        };
        assert_eq!(body["error"]["code"], 1002);
    }

    #[tokio::test]
    async fn malformed_query_without_upgrade_is_still_426() {
        let Ok(request) = Request::builder()
            .uri("/ws?token=a&token=b")
            .body(Body::empty())
        else {
            panic!("request");
        };
        let Ok(response) = router(state()).oneshot(request).await else {
            panic!("infallible");
        };
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    }

    #[tokio::test]
    async fn health_reports_connection_count() {
        let Ok(request) = Request::builder().uri("/health").body(Body::empty()) else {
            panic!("request");
        };
        let Ok(response) = router(state()).oneshot(request).await else {
            panic!("infallible");
        };
        assert_eq!(response.status(), StatusCode::OK);

        let Ok(bytes) = axum::body::to_bytes(response.into_body(), 4096).await else {
            panic!("body");
        };
        let Ok(health) = serde_json::from_slice::<HealthResponse>(&bytes) else {
            panic!("health body");
        };
        assert_eq!(health.status, "healthy");
        assert_eq!(health.connections, 0);
    }
}
