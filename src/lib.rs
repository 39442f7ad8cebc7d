//! # notify-gateway
//!
//! Realtime notification gateway. Clients hold authenticated WebSocket
//! connections; chat messages they send are published to an event broker,
//! and a separate worker consumes the broker and pushes each message back
//! to the gateway for delivery to its recipients' live connections.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket /ws?token=…)
//!     │
//!     ├── Session (ws/) ── TokenVerifier (auth/)
//!     │      │
//!     │      └── BroadcastQueue ─► DispatchWorkerPool (dispatch/)
//!     │                                │
//!     │                                ▼
//!     │                      EventProducer ─► broker (NATS JetStream)
//!     │                                               │
//!     │          notify-worker: ConsumerDispatcher ◄──┘
//!     │             ├── email   ─► RegistrationEmailHandler
//!     │             ├── logs    ─► LogStore (SQLite)
//!     │             └── message ─► MessageForwarder ─► PushGatewayClient
//!     │                                                      │
//!     ├── PushGateway RPC (rpc/) ◄───────────────────────────┘
//!     │
//!     └── ConnectionRegistry (domain/)
//! ```
//!
//! Two binaries are built: `notify-gateway` (realtime + RPC servers) and
//! `notify-worker` (consumer dispatcher and topic handlers).

pub mod app_state;
pub mod auth;
pub mod broker;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod health;
pub mod rpc;
pub mod service;
pub mod telemetry;
pub mod worker;
pub mod ws;
