//! Service layer shared by the realtime endpoint and the RPC surface.
//!
//! [`AuditLog`] publishes audit events to the `logs` topic;
//! [`PushGateway`] delivers remote pushes and forced logouts through the
//! [`crate::domain::ConnectionRegistry`].

pub mod audit;
pub mod push_gateway;

pub use audit::{AuditEvent, AuditLog};
pub use push_gateway::{LogoutOutcome, PushGateway, PushOutcome};
