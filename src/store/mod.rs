// Collaborator interfaces consumed by the routing subsystem. The router
// only ever sees these traits; the Postgres implementations back the
// production binary and the in-memory implementations back the test suite.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::message::{Message, MessagePayload, MessageTarget};

/// Input to `MessageStore::create`; id and timestamp are assigned by the
/// store, never by the caller.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: String,
    pub target: MessageTarget,
    pub payload: MessagePayload,
}

/// Channel state on record. Membership is mutated by the external
/// membership service; this subsystem only reads snapshots of it.
#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
    pub admin: String,
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Durable message store. A message returned by `create` is durable; the
/// router never dispatches before this call completes.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists the message, assigning its id and timestamp. Timestamps
    /// are monotonically non-decreasing per store, in persist completion
    /// order.
    async fn create(&self, new: NewMessage) -> AppResult<Message>;

    /// Conversation history between two users, ascending persist order.
    async fn find_direct(&self, user_a: &str, user_b: &str) -> AppResult<Vec<Message>>;

    /// Channel history, ascending persist order.
    async fn find_channel(&self, channel_id: &str) -> AppResult<Vec<Message>>;
}

#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// One self-consistent snapshot of the channel, or None if unknown.
    async fn find_by_id(&self, channel_id: &str) -> AppResult<Option<ChannelRecord>>;
}

/// Read-only view of the account service's user records, used for
/// recipient existence checks.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user_id: &str) -> AppResult<bool>;
}
