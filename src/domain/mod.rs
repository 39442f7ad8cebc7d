//! Domain layer: chat messages, broker topics, live connections and the
//! connection registry.

pub mod chat_message;
pub mod connection;
pub mod connection_registry;
pub mod topic;

pub use chat_message::ChatMessage;
pub use connection::{ClientSink, Connection, ConnectionId};
pub use connection_registry::{CloseOutcome, ConnectionRegistry, DeliveryReport};
pub use topic::{BrokerEvent, Topic};
