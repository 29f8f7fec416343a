use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::message::{Message, MessagePayload, MessageTarget, ServerFrame};
use crate::metrics;
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::resolver::ChannelResolver;
use crate::store::{MessageStore, NewMessage, UserDirectory};

/// Routes validated send requests: persist durably, then fan out to every
/// live connection in the recipient set.
///
/// Persistence is the hard synchronization point; once `create` returns,
/// dispatch is a best-effort, non-blocking enqueue per connection and a
/// failure on one connection never affects any other.
pub struct MessageRouter {
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
    resolver: ChannelResolver,
    registry: Arc<ConnectionRegistry>,
    /// Whether a channel send is echoed to the sender's other live
    /// connections. The originating connection is always excluded; it
    /// receives the acknowledgement instead.
    channel_echo_to_sender: bool,
}

impl MessageRouter {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        users: Arc<dyn UserDirectory>,
        resolver: ChannelResolver,
        registry: Arc<ConnectionRegistry>,
        channel_echo_to_sender: bool,
    ) -> Self {
        Self {
            messages,
            users,
            resolver,
            registry,
            channel_echo_to_sender,
        }
    }

    /// Persists a direct message and pushes it to the recipient's live
    /// connections. Zero live connections is not an error; the recipient
    /// recovers the message via history fetch.
    pub async fn route_direct(
        &self,
        sender: &str,
        recipient: &str,
        payload: MessagePayload,
        origin: ConnectionId,
    ) -> AppResult<Message> {
        payload.validate()?;

        if !self.users.exists(recipient).await? {
            return Err(AppError::NotFound(format!(
                "Recipient {} does not exist",
                recipient
            )));
        }

        let message = self
            .messages
            .create(NewMessage {
                sender: sender.to_string(),
                target: MessageTarget::Direct {
                    recipient: recipient.to_string(),
                },
                payload,
            })
            .await?;
        metrics::MESSAGES_PERSISTED_TOTAL.inc();

        let delivered = self.dispatch_to_user(recipient, &message, origin);
        tracing::debug!(
            message_id = %message.id,
            connections = delivered,
            "Direct message dispatched"
        );

        Ok(message)
    }

    /// Persists a channel message and pushes it to every live connection
    /// of every current member. Membership is re-resolved on every send;
    /// nothing is cached across sends.
    pub async fn route_channel(
        &self,
        sender: &str,
        channel_id: &str,
        payload: MessagePayload,
        origin: ConnectionId,
    ) -> AppResult<Message> {
        payload.validate()?;

        let membership = self.resolver.resolve(channel_id).await?;
        if !membership.contains(sender) {
            return Err(AppError::Forbidden(format!(
                "Sender is not a member of channel {}",
                channel_id
            )));
        }

        let message = self
            .messages
            .create(NewMessage {
                sender: sender.to_string(),
                target: MessageTarget::Channel {
                    channel_id: channel_id.to_string(),
                },
                payload,
            })
            .await?;
        metrics::MESSAGES_PERSISTED_TOTAL.inc();

        let mut delivered = 0;
        for member in membership.members() {
            if member == sender && !self.channel_echo_to_sender {
                continue;
            }
            delivered += self.dispatch_to_user(member, &message, origin);
        }
        tracing::debug!(
            message_id = %message.id,
            members = membership.members().len(),
            connections = delivered,
            "Channel message dispatched"
        );

        Ok(message)
    }

    /// Enqueues the message on every live connection of `user_id` except
    /// the originating one. Each enqueue is independent: a closed queue is
    /// logged and counted, and the loop continues.
    fn dispatch_to_user(&self, user_id: &str, message: &Message, origin: ConnectionId) -> usize {
        let mut delivered = 0;
        for handle in self.registry.lookup(user_id) {
            if handle.id() == origin {
                continue;
            }
            match handle.push(ServerFrame::Message(message.clone())) {
                Ok(()) => {
                    metrics::DISPATCHES_TOTAL.inc();
                    delivered += 1;
                }
                Err(err) => {
                    metrics::DISPATCH_FAILURES_TOTAL.inc();
                    tracing::warn!(
                        message_id = %message.id,
                        connection_id = %handle.id(),
                        error = %err,
                        "Dispatch to connection failed"
                    );
                }
            }
        }
        delivered
    }
}
