//! notify-gateway server entry point.
//!
//! Starts the realtime WebSocket server and the PushGateway RPC server,
//! plus the dispatch pool publishing inbound messages to the broker.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use notify_gateway::app_state::AppState;
use notify_gateway::auth::JwtVerifier;
use notify_gateway::broker::{Broker, ConsumerDispatcher, DispatcherConfig, EventProducer};
use notify_gateway::config::GatewayConfig;
use notify_gateway::dispatch::{BroadcastQueue, DispatchWorkerPool};
use notify_gateway::domain::{ConnectionRegistry, Topic};
use notify_gateway::service::{AuditLog, PushGateway};
use notify_gateway::telemetry::{init_tracing, shutdown_signal};
use notify_gateway::worker::MessageForwarder;
use notify_gateway::{rpc, ws};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().map_err(|e| anyhow!("invalid configuration: {e}"))?;
    init_tracing(config.json_logs);
    tracing::info!(
        addr = %config.listen_addr,
        rpc_addr = %config.rpc_listen_addr,
        broker = %config.broker.url,
        "starting notify-gateway"
    );

    // Broker and producer
    let broker = Broker::connect(&config.broker)
        .await
        .context("failed to connect to the event broker")?;
    let producer = EventProducer::new(broker.publisher());
    let audit = AuditLog::new(producer.clone());

    let shutdown = CancellationToken::new();
    let registry = Arc::new(ConnectionRegistry::new());

    // Inbound path: sessions -> queue -> dispatch pool -> broker
    let (queue, receiver) = BroadcastQueue::new(config.broadcast_queue_capacity);
    let pool = DispatchWorkerPool::start(
        receiver,
        producer.clone(),
        config.broadcast_workers,
        shutdown.child_token(),
    );

    let gateway = PushGateway::new(Arc::clone(&registry), audit.clone());

    // With the in-process broker nothing else drains the queues.
    let embedded = if config.broker.is_memory() {
        let mut dispatcher = ConsumerDispatcher::new(DispatcherConfig::default());
        dispatcher.register_handler(
            Topic::Message,
            Arc::new(MessageForwarder::new(Arc::new(gateway.clone()))),
        );
        let readers = broker
            .readers(&Topic::ALL, "embedded")
            .await
            .context("failed to create in-process readers")?;
        Some(dispatcher.start(readers, shutdown.child_token()))
    } else {
        None
    };

    let app_state = AppState {
        registry: Arc::clone(&registry),
        queue,
        verifier: Arc::new(JwtVerifier::new(config.jwt_secret.as_bytes())),
        audit,
    };

    // Build routers
    let realtime = ws::router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());
    let push = rpc::router(gateway).layer(TraceLayer::new_for_http());

    let ws_listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let rpc_listener = tokio::net::TcpListener::bind(config.rpc_listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.rpc_listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "realtime server listening");
    tracing::info!(addr = %config.rpc_listen_addr, "push gateway listening");

    // Upgraded sockets are not tracked by graceful shutdown; close them
    // explicitly so their sessions end.
    let signal = {
        let shutdown = shutdown.clone();
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown_signal() => shutdown.cancel(),
                () = shutdown.cancelled() => {}
            }
            let closed = registry.close_all().await;
            tracing::info!(closed, "closed live connections");
        })
    };

    let realtime_server = {
        let shutdown = shutdown.clone();
        async move {
            axum::serve(
                ws_listener,
                realtime.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .context("realtime server failed")
        }
    };
    let push_server = {
        let shutdown = shutdown.clone();
        async move {
            axum::serve(rpc_listener, push)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
                .context("push gateway server failed")
        }
    };

    let served = tokio::try_join!(realtime_server, push_server);
    // A server error also has to stop the rest of the process.
    shutdown.cancel();
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "shutdown signal task failed");
    }

    let dispatch_stats = pool.shutdown().await;
    tracing::info!(?dispatch_stats, "inbound messages flushed");
    if let Some(embedded) = embedded {
        embedded.shutdown().await;
    }

    if let Err(e) = producer.close().await {
        tracing::error!(error = %e, "failed to close event producer");
    }
    if let Err(e) = broker.close().await {
        tracing::error!(error = %e, "failed to close broker connection");
    }

    served?;
    tracing::info!("notify-gateway stopped");
    Ok(())
}
