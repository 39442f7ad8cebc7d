//! PushGateway RPC surface: JSON over HTTP.
//!
//! | Method | Path                    | Body                               |
//! |--------|-------------------------|------------------------------------|
//! | POST   | `/rpc/v1/push-message`  | `{sender, recipients, message}`    |
//! | POST   | `/rpc/v1/logout`        | `{user_id}`                        |
//! | GET    | `/health`               |                                    |
//!
//! [`PushGatewayClient`] is the matching client used by the worker.

pub mod client;
pub mod dto;
pub mod handlers;

pub use client::{MessagePusher, PushGatewayClient};
pub use dto::{LogoutRequest, LogoutResponse, PushMessageRequest, PushMessageResponse};
pub use handlers::router;
