use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::handlers::connection::ConnectionHandler;
use crate::message::{ChannelSendRequest, DirectSendRequest, Message, ServerFrame};
use crate::utils::log_safe_id;

/// The authenticated user behind this connection, or AuthError. Every
/// send/history request is gated on this.
fn authenticated_user(handler: &ConnectionHandler) -> AppResult<String> {
    handler
        .user_id()
        .map(str::to_string)
        .ok_or_else(|| AppError::Auth("Connection is not authenticated".to_string()))
}

/// The sender field on a request must match the connection's binding; a
/// mismatch is rejected without touching the store.
fn require_sender_match(claimed: &str, authenticated: &str) -> AppResult<()> {
    if claimed != authenticated {
        return Err(AppError::Auth(
            "Sender identity does not match the authenticated connection".to_string(),
        ));
    }
    Ok(())
}

async fn ack(handler: &mut ConnectionHandler, message: &Message) {
    let _ = handler
        .send_frame(&ServerFrame::Sent {
            message_id: message.id,
            timestamp: message.timestamp,
        })
        .await;
}

async fn direct_send(
    handler: &ConnectionHandler,
    ctx: &AppContext,
    req: DirectSendRequest,
) -> AppResult<Message> {
    let user_id = authenticated_user(handler)?;
    require_sender_match(&req.sender, &user_id)?;
    ctx.router
        .route_direct(
            &user_id,
            &req.recipient,
            req.payload,
            handler.connection_id(),
        )
        .await
}

pub async fn handle_direct_send(
    handler: &mut ConnectionHandler,
    ctx: &AppContext,
    req: DirectSendRequest,
) {
    let recipient = req.recipient.clone();
    match direct_send(handler, ctx, req).await {
        Ok(message) => {
            if ctx.config.logging.enable_user_identifiers {
                tracing::debug!(
                    message_id = %message.id,
                    from = %message.sender,
                    to = %recipient,
                    "Direct message accepted"
                );
            } else {
                tracing::debug!(
                    message_id = %message.id,
                    to_hash = %log_safe_id(&recipient, &ctx.config.logging.hash_salt),
                    "Direct message accepted"
                );
            }
            ack(handler, &message).await;
        }
        Err(e) => handler.send_app_error(&e).await,
    }
}

async fn channel_send(
    handler: &ConnectionHandler,
    ctx: &AppContext,
    req: ChannelSendRequest,
) -> AppResult<Message> {
    let user_id = authenticated_user(handler)?;
    require_sender_match(&req.sender, &user_id)?;
    ctx.router
        .route_channel(
            &user_id,
            &req.channel_id,
            req.payload,
            handler.connection_id(),
        )
        .await
}

pub async fn handle_channel_send(
    handler: &mut ConnectionHandler,
    ctx: &AppContext,
    req: ChannelSendRequest,
) {
    let channel_id = req.channel_id.clone();
    match channel_send(handler, ctx, req).await {
        Ok(message) => {
            tracing::debug!(
                message_id = %message.id,
                channel_id = %channel_id,
                "Channel message accepted"
            );
            ack(handler, &message).await;
        }
        Err(e) => handler.send_app_error(&e).await,
    }
}

async fn direct_history(
    handler: &ConnectionHandler,
    ctx: &AppContext,
    peer: &str,
) -> AppResult<Vec<Message>> {
    let user_id = authenticated_user(handler)?;
    ctx.messages.find_direct(&user_id, peer).await
}

/// History fetch for a direct conversation: everything the store holds
/// between the caller and the peer, ascending persist order. This is the
/// recovery path for messages missed while offline.
pub async fn handle_direct_history(
    handler: &mut ConnectionHandler,
    ctx: &AppContext,
    peer: String,
) {
    match direct_history(handler, ctx, &peer).await {
        Ok(messages) => {
            let _ = handler.send_frame(&ServerFrame::History { messages }).await;
        }
        Err(e) => handler.send_app_error(&e).await,
    }
}

async fn channel_history(
    handler: &ConnectionHandler,
    ctx: &AppContext,
    channel_id: &str,
) -> AppResult<Vec<Message>> {
    let user_id = authenticated_user(handler)?;
    let membership = ctx.resolver.resolve(channel_id).await?;
    if !membership.contains(&user_id) {
        return Err(AppError::Forbidden(format!(
            "Not a member of channel {}",
            channel_id
        )));
    }
    ctx.messages.find_channel(channel_id).await
}

/// History fetch for a channel; membership-gated like sends.
pub async fn handle_channel_history(
    handler: &mut ConnectionHandler,
    ctx: &AppContext,
    channel_id: String,
) {
    match channel_history(handler, ctx, &channel_id).await {
        Ok(messages) => {
            let _ = handler.send_frame(&ServerFrame::History { messages }).await;
        }
        Err(e) => handler.send_app_error(&e).await,
    }
}
