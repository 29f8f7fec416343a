use std::net::SocketAddr;

use futures_util::SinkExt;
use futures_util::stream::SplitSink;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::{AppError, AppResult};
use crate::message::ServerFrame;
use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};

pub type WebSocketStreamType = WebSocketStream<TcpStream>;

/// Per-connection state machine. The Unauthenticated → Authenticated
/// transition fires at most once, gated by token verification; Closed is
/// terminal.
#[derive(Debug)]
enum ConnectionState {
    Unauthenticated,
    Authenticated(String),
    Closed,
}

pub struct ConnectionHandler {
    ws_sender: SplitSink<WebSocketStreamType, WsMessage>,
    tx: mpsc::UnboundedSender<ServerFrame>,
    conn_id: ConnectionId,
    state: ConnectionState,
    addr: SocketAddr,
}

impl ConnectionHandler {
    pub fn new(
        ws_sender: SplitSink<WebSocketStreamType, WsMessage>,
        tx: mpsc::UnboundedSender<ServerFrame>,
        addr: SocketAddr,
    ) -> Self {
        Self {
            ws_sender,
            tx,
            conn_id: ConnectionId::new(),
            state: ConnectionState::Unauthenticated,
            addr,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn user_id(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Authenticated(user_id) => Some(user_id),
            _ => None,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Delivery endpoint for this connection, handed to the registry.
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle::new(self.conn_id, self.tx.clone())
    }

    /// Binds the authenticated identity to this connection. Valid exactly
    /// once, from the unauthenticated state; the binding is immutable for
    /// the connection's lifetime.
    pub fn bind(&mut self, user_id: String) -> AppResult<()> {
        match self.state {
            ConnectionState::Unauthenticated => {
                self.state = ConnectionState::Authenticated(user_id);
                Ok(())
            }
            _ => Err(AppError::Auth(
                "Connection is already authenticated".to_string(),
            )),
        }
    }

    pub async fn send_frame(&mut self, frame: &ServerFrame) -> AppResult<()> {
        let json = serde_json::to_string(frame)?;
        self.ws_sender
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|e| AppError::Dispatch(format!("Failed to write to {}: {}", self.addr, e)))
    }

    pub async fn send_error(&mut self, code: &str, message: &str) {
        let frame = ServerFrame::Error {
            code: code.to_string(),
            message: message.to_string(),
        };
        if self.send_frame(&frame).await.is_err() {
            tracing::debug!("Failed to send error to disconnected client {}", self.addr);
        }
    }

    pub async fn send_app_error(&mut self, err: &AppError) {
        err.log();
        self.send_error(err.error_code(), &err.user_message()).await;
    }

    pub async fn send_pong(&mut self, data: bytes::Bytes) {
        let _ = self.ws_sender.send(WsMessage::Pong(data)).await;
    }

    /// Unregisters the connection and closes the state machine. Runs on
    /// every termination path; the second call is a no-op and can never
    /// remove another connection of the same user.
    pub fn disconnect(&mut self, registry: &ConnectionRegistry) {
        if let ConnectionState::Authenticated(user_id) =
            std::mem::replace(&mut self.state, ConnectionState::Closed)
        {
            registry.unregister(&user_id, self.conn_id);
            tracing::debug!(connection_id = %self.conn_id, "Connection unregistered");
        }
    }
}
