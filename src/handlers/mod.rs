mod connection;
mod messages;
pub mod session;

pub use connection::{ConnectionHandler, WebSocketStreamType};

use std::net::SocketAddr;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::config::MAX_WEBSOCKET_MESSAGE_SIZE;
use crate::context::AppContext;
use crate::message::ClientFrame;
use crate::metrics;

/// Serves one connection for its whole lifetime: the read half parses
/// client frames, the write half drains the connection's outbound queue.
/// The queue is the only way anything reaches this socket, so writes from
/// concurrent fan-outs never interleave.
pub async fn handle_websocket(ws_stream: WebSocketStreamType, addr: SocketAddr, ctx: AppContext) {
    metrics::CONNECTIONS_TOTAL.inc();
    tracing::info!("New connection from: {}", addr);

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut handler = ConnectionHandler::new(ws_sender, tx, addr);

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        if text.len() > MAX_WEBSOCKET_MESSAGE_SIZE {
                            tracing::warn!("Oversized frame from {} ({} bytes)", addr, text.len());
                            handler.send_error("INVALID_FORMAT", "Message too large").await;
                            continue;
                        }

                        match serde_json::from_str::<ClientFrame>(text.as_str()) {
                            Ok(ClientFrame::Connect { token }) => {
                                if !session::handle_connect(&mut handler, &ctx, token).await {
                                    break;
                                }
                            }
                            Ok(ClientFrame::DirectSend(req)) => {
                                messages::handle_direct_send(&mut handler, &ctx, req).await;
                            }
                            Ok(ClientFrame::ChannelSend(req)) => {
                                messages::handle_channel_send(&mut handler, &ctx, req).await;
                            }
                            Ok(ClientFrame::DirectHistory { peer }) => {
                                messages::handle_direct_history(&mut handler, &ctx, peer).await;
                            }
                            Ok(ClientFrame::ChannelHistory { channel_id }) => {
                                messages::handle_channel_history(&mut handler, &ctx, channel_id).await;
                            }
                            Ok(ClientFrame::Logout) => {
                                tracing::info!("Client logged out: {}", addr);
                                break;
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse frame from {}: {}", addr, e);
                                handler.send_error("INVALID_FORMAT", "Invalid message format").await;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        tracing::info!("Connection closed by client: {}", addr);
                        break;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        handler.send_pong(data).await;
                    }
                    Some(Err(e)) => {
                        // Transport failure is a disconnect; it never
                        // propagates past this task.
                        tracing::warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            outbound = rx.recv() => {
                match outbound {
                    Some(frame) => {
                        if handler.send_frame(&frame).await.is_err() {
                            break;
                        }
                    }
                    // Unreachable while the handler holds a sender clone.
                    None => break,
                }
            }
        }
    }

    handler.disconnect(&ctx.registry);
    tracing::info!("Connection closed: {}", addr);
}
