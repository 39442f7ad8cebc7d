//! Configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). The gateway and the worker share the
//! [`BrokerConfig`] section and each add their own settings.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;

/// Connection settings for the event broker, shared by both processes.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker URL. `memory://` selects the in-process broker.
    pub url: String,

    /// JetStream stream holding all topics.
    pub stream: String,

    /// Subject prefix; topic `message` is published on `<prefix>.message`.
    pub subject_prefix: String,

    /// Timeout in seconds for establishing the broker connection.
    pub connect_timeout_secs: u64,
}

impl BrokerConfig {
    /// Loads broker settings from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("BROKER_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            stream: std::env::var("BROKER_STREAM").unwrap_or_else(|_| "CHAT".to_string()),
            subject_prefix: std::env::var("BROKER_SUBJECT_PREFIX")
                .unwrap_or_else(|_| "chat".to_string()),
            connect_timeout_secs: parse_env("BROKER_CONNECT_TIMEOUT_SECS", 5),
        }
    }

    /// Returns `true` when the in-process broker was requested.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.url.starts_with("memory://")
    }

    /// Connection timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            stream: "CHAT".to_string(),
            subject_prefix: "chat".to_string(),
            connect_timeout_secs: 5,
        }
    }
}

/// Configuration of the gateway process (WebSocket + PushGateway RPC).
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address of the realtime (WebSocket) server.
    pub listen_addr: SocketAddr,

    /// Socket address of the PushGateway RPC server.
    pub rpc_listen_addr: SocketAddr,

    /// HMAC secret used to verify bearer tokens.
    pub jwt_secret: String,

    /// Number of dispatch workers publishing inbound messages.
    pub broadcast_workers: usize,

    /// Capacity of the shared broadcast queue.
    pub broadcast_queue_capacity: usize,

    /// Broker connection settings.
    pub broker: BrokerConfig,

    /// Emit JSON logs instead of human-readable text.
    pub json_logs: bool,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` or `RPC_LISTEN_ADDR` is set but
    /// cannot be parsed as a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3001".to_string())
            .parse()?;
        let rpc_listen_addr: SocketAddr = std::env::var("RPC_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:50051".to_string())
            .parse()?;

        let jwt_secret =
            std::env::var("JWT_SECRET").unwrap_or_else(|_| "secret-key".to_string());

        // Zero workers would leave the queue undrained forever.
        let broadcast_workers = parse_env("BROADCAST_WORKERS", 8_usize).max(1);
        let broadcast_queue_capacity = parse_env("BROADCAST_QUEUE_CAPACITY", 1024_usize).max(1);

        Ok(Self {
            listen_addr,
            rpc_listen_addr,
            jwt_secret,
            broadcast_workers,
            broadcast_queue_capacity,
            broker: BrokerConfig::from_env(),
            json_logs: json_logs_from_env(),
        })
    }
}

/// Configuration of the worker process (consumer dispatcher + handlers).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Consumer group shared by every worker process.
    pub consumer_group: String,

    /// Number of dispatcher worker tasks.
    pub consumer_workers: usize,

    /// Capacity of the shared job queue between readers and workers.
    pub consumer_queue_capacity: usize,

    /// First retry delay after a poll error, in milliseconds.
    pub backoff_initial_ms: u64,

    /// Upper bound on the retry delay, in milliseconds.
    pub backoff_max_ms: u64,

    /// Base URL of the gateway's PushGateway RPC server.
    pub push_gateway_url: String,

    /// Request timeout for PushGateway calls, in seconds.
    pub push_gateway_timeout_secs: u64,

    /// sqlx connection string for the log store.
    pub log_database_url: String,

    /// Sender address of registration emails.
    pub email_from: String,

    /// Broker connection settings.
    pub broker: BrokerConfig,

    /// Emit JSON logs instead of human-readable text.
    pub json_logs: bool,
}

impl WorkerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set or invalid.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            consumer_group: std::env::var("CONSUMER_GROUP")
                .unwrap_or_else(|_| "chatapp-consumer-group".to_string()),
            consumer_workers: parse_env("CONSUMER_WORKERS", 10_usize).max(1),
            consumer_queue_capacity: parse_env("CONSUMER_QUEUE_CAPACITY", 1000_usize).max(1),
            backoff_initial_ms: parse_env("CONSUMER_BACKOFF_INITIAL_MS", 100),
            backoff_max_ms: parse_env("CONSUMER_BACKOFF_MAX_MS", 10_000),
            push_gateway_url: std::env::var("PUSH_GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:50051".to_string()),
            push_gateway_timeout_secs: parse_env("PUSH_GATEWAY_TIMEOUT_SECS", 10),
            log_database_url: std::env::var("LOG_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://logs.db?mode=rwc".to_string()),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "noreply@localhost".to_string()),
            broker: BrokerConfig::from_env(),
            json_logs: json_logs_from_env(),
        }
    }
}

impl WorkerConfig {
    /// Checks that the loaded settings can work together.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InProcessBroker`] when the broker URL is
    /// `memory://`: nothing outside this process could publish to it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.is_memory() {
            return Err(ConfigError::InProcessBroker {
                url: self.broker.url.clone(),
            });
        }
        Ok(())
    }
}

fn json_logs_from_env() -> bool {
    std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker_config(broker_url: &str) -> WorkerConfig {
        WorkerConfig {
            consumer_group: "group".to_string(),
            consumer_workers: 1,
            consumer_queue_capacity: 1,
            backoff_initial_ms: 100,
            backoff_max_ms: 1000,
            push_gateway_url: "http://localhost:50051".to_string(),
            push_gateway_timeout_secs: 10,
            log_database_url: "sqlite::memory:".to_string(),
            email_from: "noreply@localhost".to_string(),
            broker: BrokerConfig {
                url: broker_url.to_string(),
                ..BrokerConfig::default()
            },
            json_logs: false,
        }
    }

    #[test]
    fn worker_refuses_in_process_broker() {
        let err = worker_config("memory://").validate();
        assert!(matches!(err, Err(ConfigError::InProcessBroker { ref url }) if url == "memory://"));
        assert!(worker_config("nats://localhost:4222").validate().is_ok());
    }

    #[test]
    fn parse_env_falls_back_on_missing_key() {
        let value: usize = parse_env("NOTIFY_GATEWAY_TEST_UNSET_KEY", 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn memory_url_selects_in_process_broker() {
        let cfg = BrokerConfig::default();
        assert!(cfg.is_memory());

        let nats = BrokerConfig {
            url: "nats://localhost:4222".to_string(),
            ..BrokerConfig::default()
        };
        assert!(!nats.is_memory());
        assert_eq!(nats.connect_timeout(), Duration::from_secs(5));
    }
}
