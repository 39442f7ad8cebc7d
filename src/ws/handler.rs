//! Axum WebSocket upgrade handler.

use std::net::SocketAddr;

use axum::extract::rejection::{ExtensionRejection, QueryRejection};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, Query, State};
use axum::response::Response;

use super::messages::ConnectParams;
use super::session::run_session;
use crate::app_state::AppState;
use crate::error::GatewayError;

/// `GET /ws?token=<jwt>`: Upgrade HTTP connection to WebSocket.
///
/// Requests that are not a WebSocket upgrade get `426 Upgrade Required`
/// and never reach the session lifecycle.
///
/// # Errors
///
/// Returns [`GatewayError::UpgradeRequired`] for non-upgrade requests.
pub async fn ws_handler(
    State(state): State<AppState>,
    connect_info: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    params: Result<Query<ConnectParams>, QueryRejection>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, GatewayError> {
    let remote_addr = connect_info.ok().map(|ConnectInfo(addr)| addr);

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::error!(path = "/ws", remote_addr = ?remote_addr, reason = %rejection, "websocket upgrade required");
            return Err(GatewayError::UpgradeRequired);
        }
    };

    // An unreadable query carries no usable token.
    let token = match params {
        Ok(Query(params)) => params.token,
        Err(rejection) => {
            tracing::debug!(remote_addr = ?remote_addr, reason = %rejection, "unreadable query string");
            None
        }
    };

    tracing::info!(path = "/ws", remote_addr = ?remote_addr, "websocket upgrade requested");
    Ok(ws.on_upgrade(move |socket| run_session(socket, state, token, remote_addr)))
}
