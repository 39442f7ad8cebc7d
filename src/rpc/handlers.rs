//! PushGateway RPC server handlers.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::dto::{LogoutRequest, LogoutResponse, PushMessageRequest, PushMessageResponse};
use crate::domain::ChatMessage;
use crate::error::GatewayError;
use crate::health::HealthResponse;
use crate::service::PushGateway;

/// `POST /rpc/v1/push-message`: Deliver a message to connected recipients.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if the body is not a valid
/// push request.
pub async fn push_message_handler(
    State(gateway): State<PushGateway>,
    body: Result<Json<PushMessageRequest>, JsonRejection>,
) -> Result<Json<PushMessageResponse>, GatewayError> {
    let Json(req) = body.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;
    let message = ChatMessage::from(req);
    let outcome = gateway.push_message(&message).await;
    Ok(Json(PushMessageResponse {
        success: outcome.success,
        delivered: outcome.report.delivered,
    }))
}

/// `POST /rpc/v1/logout`: Force-close a user's connection.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if the body is malformed.
/// Any `user_id`, even one that was never connected, succeeds.
pub async fn logout_handler(
    State(gateway): State<PushGateway>,
    body: Result<Json<LogoutRequest>, JsonRejection>,
) -> Result<Json<LogoutResponse>, GatewayError> {
    let Json(req) = body.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;
    let outcome = gateway.logout(&req.user_id).await;
    Ok(Json(LogoutResponse {
        success: outcome.success,
        was_connected: outcome.was_connected(),
    }))
}

/// `GET /health`: RPC server health.
pub async fn health_handler(State(gateway): State<PushGateway>) -> impl IntoResponse {
    Json(HealthResponse::snapshot(gateway.registry()).await)
}

/// Router for the RPC server.
pub fn router(gateway: PushGateway) -> Router {
    Router::new()
        .route("/rpc/v1/push-message", post(push_message_handler))
        .route("/rpc/v1/logout", post(logout_handler))
        .route("/health", get(health_handler))
        .with_state(gateway)
}
