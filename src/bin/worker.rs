//! notify-worker entry point.
//!
//! Consumes the `email`, `logs` and `message` topics as one consumer group
//! and routes each event to its handler. Chat messages are pushed back to
//! the gateway over the PushGateway RPC.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use notify_gateway::broker::{Broker, ConsumerDispatcher, DispatcherConfig};
use notify_gateway::config::WorkerConfig;
use notify_gateway::domain::Topic;
use notify_gateway::rpc::PushGatewayClient;
use notify_gateway::telemetry::{init_tracing, shutdown_signal};
use notify_gateway::worker::{
    LogStore, LoggingEmailDispatcher, MessageForwarder, RegistrationEmailHandler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    init_tracing(config.json_logs);
    config.validate().context("invalid worker configuration")?;
    tracing::info!(
        group = %config.consumer_group,
        broker = %config.broker.url,
        push_gateway = %config.push_gateway_url,
        "starting notify-worker"
    );

    let broker = Broker::connect(&config.broker)
        .await
        .context("failed to connect to the event broker")?;
    let store = LogStore::connect(&config.log_database_url)
        .await
        .with_context(|| format!("failed to open log store {}", config.log_database_url))?;
    let client = PushGatewayClient::new(
        config.push_gateway_url.as_str(),
        Duration::from_secs(config.push_gateway_timeout_secs),
    )
    .context("failed to build push gateway client")?;

    let mut dispatcher = ConsumerDispatcher::new(DispatcherConfig {
        workers: config.consumer_workers,
        queue_capacity: config.consumer_queue_capacity,
        backoff_initial: Duration::from_millis(config.backoff_initial_ms),
        backoff_max: Duration::from_millis(config.backoff_max_ms),
    });
    dispatcher.register_handler(
        Topic::Email,
        Arc::new(RegistrationEmailHandler::new(
            config.email_from.as_str(),
            Arc::new(LoggingEmailDispatcher),
        )),
    );
    dispatcher.register_handler(Topic::Logs, Arc::new(store.clone()));
    dispatcher.register_handler(Topic::Message, Arc::new(MessageForwarder::new(Arc::new(client))));

    let readers = broker
        .readers(&Topic::ALL, &config.consumer_group)
        .await
        .context("failed to subscribe to topics")?;
    let running = dispatcher.start(readers, CancellationToken::new());

    shutdown_signal().await;

    let stats = running.shutdown().await;
    tracing::info!(?stats, "consumer stopped");

    store.close().await;
    if let Err(e) = broker.close().await {
        tracing::error!(error = %e, "failed to close broker connection");
    }
    tracing::info!("notify-worker stopped");
    Ok(())
}
