use std::sync::Arc;
use std::time::Duration;

use courier_server::{
    auth::AuthManager,
    config::{Config, LoggingConfig},
    context::AppContext,
    message::{ClientFrame, ServerFrame},
    registry::ConnectionRegistry,
    resolver::ChannelResolver,
    router::MessageRouter,
    run_websocket_server,
    store::memory::MemoryStore,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};

pub const TEST_JWT_SECRET: &str = "courier-test-secret-0123456789abcdef";
pub const TEST_ISSUER: &str = "courier-test";

pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryStore>,
    pub auth: Arc<AuthManager>,
}

impl TestApp {
    pub fn token_for(&self, user_id: &str) -> String {
        let (token, _jti, _exp) = self.auth.create_token(user_id).unwrap();
        token
    }
}

/// Starts the real WebSocket server on an ephemeral port, wired to
/// in-memory stores and a real HS256 verifier.
pub async fn spawn_app() -> TestApp {
    spawn_app_with_echo(true).await
}

pub async fn spawn_app_with_echo(channel_echo_to_sender: bool) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("127.0.0.1:{}", port);

    let config = Arc::new(Config {
        port,
        health_port: 0,
        database_url: String::new(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_issuer: TEST_ISSUER.to_string(),
        channel_echo_to_sender,
        logging: LoggingConfig {
            enable_user_identifiers: true,
            hash_salt: "test-salt".to_string(),
        },
        rust_log: "info".to_string(),
    });

    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(AuthManager::new(TEST_JWT_SECRET, TEST_ISSUER).unwrap());
    let registry = Arc::new(ConnectionRegistry::new());
    let resolver = ChannelResolver::new(store.clone());
    let router = Arc::new(MessageRouter::new(
        store.clone(),
        store.clone(),
        resolver.clone(),
        registry.clone(),
        channel_echo_to_sender,
    ));

    let ctx = AppContext::new(
        config,
        auth.clone(),
        registry,
        router,
        store.clone(),
        resolver,
    );

    tokio::spawn(run_websocket_server(ctx, listener));

    TestApp {
        address,
        store,
        auth,
    }
}

pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl TestClient {
    pub async fn connect(address: &str) -> Self {
        let (ws, _) = connect_async(format!("ws://{}", address)).await.unwrap();
        Self { ws }
    }

    /// Connects and authenticates, asserting the Connected handshake.
    pub async fn connect_as(app: &TestApp, user_id: &str) -> Self {
        let mut client = Self::connect(&app.address).await;
        client
            .send(&ClientFrame::Connect {
                token: app.token_for(user_id),
            })
            .await;
        match client.recv().await {
            Some(ServerFrame::Connected { user_id: uid }) => assert_eq!(uid, user_id),
            other => panic!("Expected Connected for {}, got: {:?}", user_id, other),
        }
        client
    }

    pub async fn send(&mut self, frame: &ClientFrame) {
        let json = serde_json::to_string(frame).unwrap();
        self.ws.send(WsMessage::Text(json.into())).await.unwrap();
    }

    pub async fn send_raw_text(&mut self, text: &str) {
        self.ws
            .send(WsMessage::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    /// Next server frame, or None on timeout/close.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        loop {
            match tokio::time::timeout(Duration::from_secs(2), self.ws.next()).await {
                Err(_) => return None,
                Ok(None) => return None,
                Ok(Some(Ok(WsMessage::Text(text)))) => {
                    return Some(serde_json::from_str(text.as_str()).unwrap());
                }
                Ok(Some(Ok(WsMessage::Close(_)))) => return None,
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(_))) => return None,
            }
        }
    }

    /// Asserts that no frame arrives within the window.
    pub async fn expect_silence(&mut self, window: Duration) {
        match tokio::time::timeout(window, self.ws.next()).await {
            Err(_) => {}
            Ok(None) => {}
            Ok(Some(Ok(WsMessage::Text(text)))) => {
                panic!("Expected silence, got frame: {}", text.as_str());
            }
            Ok(Some(_)) => {}
        }
    }

    /// Graceful close; gives the server a moment to unregister.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// The server handles disconnects asynchronously; tests that depend on a
/// prior registration/unregistration settle briefly.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}
