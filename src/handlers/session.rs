use crate::context::AppContext;
use crate::error::AppResult;
use crate::handlers::connection::ConnectionHandler;
use crate::message::ServerFrame;
use crate::utils::log_safe_id;

/// Establishes an authenticated session:
/// 1. Verifies the credential token
/// 2. Binds the user id to the connection (at most once per connection)
/// 3. Registers the connection for delivery
pub async fn establish_session(
    handler: &mut ConnectionHandler,
    ctx: &AppContext,
    token: &str,
) -> AppResult<String> {
    let user_id = ctx.auth.verify(token)?;

    handler.bind(user_id.clone())?;
    ctx.registry.register(&user_id, handler.handle());

    handler
        .send_frame(&ServerFrame::Connected {
            user_id: user_id.clone(),
        })
        .await?;

    if ctx.config.logging.enable_user_identifiers {
        tracing::info!(
            user_id = %user_id,
            connection_id = %handler.connection_id(),
            online_users = ctx.registry.online_user_count(),
            "Session established"
        );
    } else {
        tracing::info!(
            user_hash = %log_safe_id(&user_id, &ctx.config.logging.hash_salt),
            connection_id = %handler.connection_id(),
            online_users = ctx.registry.online_user_count(),
            "Session established"
        );
    }

    Ok(user_id)
}

/// Handles a Connect frame. Returns false when the connection must be
/// closed: a connection that fails verification is never registered and
/// does not stay open.
pub async fn handle_connect(
    handler: &mut ConnectionHandler,
    ctx: &AppContext,
    token: String,
) -> bool {
    match establish_session(handler, ctx, &token).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(addr = %handler.addr(), error = %e, "Session establishment failed");
            handler.send_app_error(&e).await;
            false
        }
    }
}
