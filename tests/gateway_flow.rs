//! End-to-end flow over real sockets: WebSocket clients, the in-process
//! broker, a consumer dispatcher and the PushGateway RPC.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header, encode};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use notify_gateway::app_state::AppState;
use notify_gateway::auth::JwtVerifier;
use notify_gateway::broker::{
    ConsumerDispatcher, DispatcherConfig, EventProducer, MemoryBroker, RunningDispatcher,
    TopicReader,
};
use notify_gateway::dispatch::{BroadcastQueue, DispatchWorkerPool};
use notify_gateway::domain::{ConnectionRegistry, Topic};
use notify_gateway::rpc::PushGatewayClient;
use notify_gateway::service::{AuditLog, PushGateway};
use notify_gateway::worker::MessageForwarder;
use notify_gateway::{rpc, ws};

const SECRET: &[u8] = b"integration-secret";
const WAIT: Duration = Duration::from_secs(5);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Gateway {
    ws_addr: SocketAddr,
    rpc_addr: SocketAddr,
    broker: MemoryBroker,
    registry: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
    _pool: DispatchWorkerPool,
}

impl Gateway {
    async fn start() -> Self {
        let broker = MemoryBroker::new(256);
        let producer = EventProducer::new(Arc::new(broker.clone()));
        let audit = AuditLog::new(producer.clone());
        let registry = Arc::new(ConnectionRegistry::new());
        let shutdown = CancellationToken::new();

        let (queue, receiver) = BroadcastQueue::new(64);
        let pool = DispatchWorkerPool::start(receiver, producer, 2, shutdown.child_token());

        let state = AppState {
            registry: Arc::clone(&registry),
            queue,
            verifier: Arc::new(JwtVerifier::new(SECRET)),
            audit: audit.clone(),
        };
        let gateway = PushGateway::new(Arc::clone(&registry), audit);

        let Ok(ws_listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind realtime listener");
        };
        let Ok(rpc_listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind rpc listener");
        };
        let (Ok(ws_addr), Ok(rpc_addr)) = (ws_listener.local_addr(), rpc_listener.local_addr())
        else {
            panic!("local addr");
        };

        let realtime = ws::router(state).into_make_service_with_connect_info::<SocketAddr>();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(ws_listener, realtime)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
        });
        let push = rpc::router(gateway);
        let token = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(rpc_listener, push)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
        });

        Self {
            ws_addr,
            rpc_addr,
            broker,
            registry,
            shutdown,
            _pool: pool,
        }
    }

    fn rpc_client(&self) -> PushGatewayClient {
        let Ok(client) = PushGatewayClient::new(format!("http://{}", self.rpc_addr), WAIT) else {
            panic!("client");
        };
        client
    }

    /// Worker-side dispatcher forwarding the `message` topic back over RPC.
    fn start_forwarder(&self) -> RunningDispatcher {
        let mut dispatcher = ConsumerDispatcher::new(DispatcherConfig {
            workers: 2,
            queue_capacity: 16,
            ..DispatcherConfig::default()
        });
        dispatcher.register_handler(
            Topic::Message,
            Arc::new(MessageForwarder::new(Arc::new(self.rpc_client()))),
        );
        let readers: Vec<Box<dyn TopicReader>> = vec![Box::new(self.broker.reader(Topic::Message))];
        dispatcher.start(readers, self.shutdown.child_token())
    }

    async fn connect(&self, token: &str) -> Client {
        let url = format!("ws://{}/ws?token={token}", self.ws_addr);
        let Ok(Ok((client, _))) = tokio::time::timeout(WAIT, connect_async(url)).await else {
            panic!("websocket handshake");
        };
        client
    }

    async fn connect_admitted(&self, user: &str) -> Client {
        let mut client = self.connect(&token_for(user)).await;
        assert_eq!(next_text(&mut client).await.as_deref(), Some("Welcome back!"));
        client
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn token_for(user: &str) -> String {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        + 3600;
    let claims = serde_json::json!({ "id": user, "exp": exp });
    let Ok(token) = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)) else {
        panic!("encode token");
    };
    token
}

/// Next text frame, or `None` once the server closed the connection.
async fn next_text(client: &mut Client) -> Option<String> {
    loop {
        let Ok(frame) = tokio::time::timeout(WAIT, client.next()).await else {
            panic!("timed out waiting for a frame");
        };
        match frame {
            Some(Ok(Message::Text(text))) => return Some(text.as_str().to_string()),
            Some(Ok(Message::Close(_)) | Err(_)) | None => return None,
            Some(Ok(_)) => {}
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn message_travels_through_broker_to_recipient() {
    let gateway = Gateway::start().await;
    let forwarder = gateway.start_forwarder();

    let mut bob = gateway.connect_admitted("bob").await;
    let mut alice = gateway.connect_admitted("alice").await;

    let frame = r#"{"sender":"alice","recipients":["bob"],"message":"hi"}"#;
    let Ok(()) = alice.send(Message::text(frame.to_string())).await else {
        panic!("send");
    };

    assert_eq!(next_text(&mut bob).await.as_deref(), Some("\"hi\""));

    let published: Vec<_> = gateway
        .broker
        .published()
        .into_iter()
        .filter(|e| e.topic == Topic::Message)
        .collect();
    let [event] = published.as_slice() else {
        panic!("exactly one message event, got {}", published.len());
    };
    assert_eq!(event.key, "alice");

    let stats = forwarder.shutdown().await;
    assert_eq!(stats.handled, 1);
}

#[tokio::test]
async fn spoofed_sender_is_published_under_admitted_identity() {
    let gateway = Gateway::start().await;
    let mut alice = gateway.connect_admitted("alice").await;

    let frame = r#"{"sender":"mallory","recipients":["bob"],"message":"x"}"#;
    let Ok(()) = alice.send(Message::text(frame.to_string())).await else {
        panic!("send");
    };

    let broker = gateway.broker.clone();
    wait_until(|| broker.published().iter().any(|e| e.topic == Topic::Message)).await;
    let Some(event) = broker.published().into_iter().find(|e| e.topic == Topic::Message) else {
        panic!("message event");
    };
    assert_eq!(event.key, "alice");
    assert!(event.payload_str().contains("\"sender\":\"alice\""));
}

#[tokio::test]
async fn invalid_token_is_rejected_and_audited() {
    let gateway = Gateway::start().await;
    let mut client = gateway.connect("not-a-jwt").await;

    assert_eq!(next_text(&mut client).await.as_deref(), Some("Invalid token"));
    assert_eq!(next_text(&mut client).await, None);
    assert!(gateway.registry.is_empty().await);

    let broker = gateway.broker.clone();
    wait_until(|| broker.published().iter().any(|e| e.topic == Topic::Logs)).await;
    let Some(audit) = broker.published().into_iter().find(|e| e.topic == Topic::Logs) else {
        panic!("audit event");
    };
    assert_eq!(audit.key, "Token");
    assert!(audit.payload_str().contains("Invalid token"));
}

#[tokio::test]
async fn second_connection_evicts_the_first() {
    let gateway = Gateway::start().await;
    let mut first = gateway.connect_admitted("carol").await;
    let _second = gateway.connect_admitted("carol").await;

    assert_eq!(next_text(&mut first).await, None);
    assert_eq!(gateway.registry.len().await, 1);
}

#[tokio::test]
async fn logout_closes_live_connection() {
    let gateway = Gateway::start().await;
    let client = gateway.rpc_client();

    let Ok(unknown) = client.logout("ghost").await else {
        panic!("logout rpc");
    };
    assert!(unknown.success);
    assert!(!unknown.was_connected);

    let mut dave = gateway.connect_admitted("dave").await;
    let Ok(known) = client.logout("dave").await else {
        panic!("logout rpc");
    };
    assert!(known.was_connected);
    assert_eq!(next_text(&mut dave).await, None);
    assert!(!gateway.registry.is_connected("dave").await);
}

#[tokio::test]
async fn plain_http_request_gets_upgrade_required() {
    let gateway = Gateway::start().await;
    let Ok(response) = reqwest::get(format!("http://{}/ws", gateway.ws_addr)).await else {
        panic!("http request");
    };
    assert_eq!(response.status(), reqwest::StatusCode::UPGRADE_REQUIRED);
}
