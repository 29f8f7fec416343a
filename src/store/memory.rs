//! In-memory store implementations. These back the integration test suite,
//! which runs the real WebSocket server against them instead of Postgres.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{ChannelRecord, ChannelStore, MessageStore, NewMessage, UserDirectory};
use crate::error::AppResult;
use crate::message::{Message, MessageTarget};

struct Inner {
    users: HashSet<String>,
    channels: HashMap<String, ChannelRecord>,
    messages: Vec<Message>,
    last_timestamp: DateTime<Utc>,
}

/// Single-mutex store: persist order is Vec order, and timestamps are
/// strictly increasing (equal wall-clock readings are bumped by 1µs).
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                users: HashSet::new(),
                channels: HashMap::new(),
                messages: Vec::new(),
                last_timestamp: DateTime::<Utc>::MIN_UTC,
            }),
        }
    }

    pub fn add_user(&self, user_id: &str) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.users.insert(user_id.to_string());
    }

    pub fn add_channel(&self, id: &str, name: &str, admin: &str, members: &[&str]) {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.channels.insert(
            id.to_string(),
            ChannelRecord {
                id: id.to_string(),
                name: name.to_string(),
                admin: admin.to_string(),
                members: members.iter().map(|m| m.to_string()).collect(),
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub fn remove_channel_member(&self, channel_id: &str, user_id: &str) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        if let Some(channel) = inner.channels.get_mut(channel_id) {
            channel.members.retain(|m| m != user_id);
            channel.updated_at = Utc::now();
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create(&self, new: NewMessage) -> AppResult<Message> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");

        let now = Utc::now();
        let timestamp = if now > inner.last_timestamp {
            now
        } else {
            inner.last_timestamp + Duration::microseconds(1)
        };
        inner.last_timestamp = timestamp;

        let message = Message {
            id: Uuid::new_v4(),
            sender: new.sender,
            target: new.target,
            payload: new.payload,
            timestamp,
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn find_direct(&self, user_a: &str, user_b: &str) -> AppResult<Vec<Message>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner
            .messages
            .iter()
            .filter(|m| match &m.target {
                MessageTarget::Direct { recipient } => {
                    (m.sender == user_a && recipient == user_b)
                        || (m.sender == user_b && recipient == user_a)
                }
                MessageTarget::Channel { .. } => false,
            })
            .cloned()
            .collect())
    }

    async fn find_channel(&self, channel_id: &str) -> AppResult<Vec<Message>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner
            .messages
            .iter()
            .filter(|m| {
                matches!(&m.target, MessageTarget::Channel { channel_id: c } if c == channel_id)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn find_by_id(&self, channel_id: &str) -> AppResult<Option<ChannelRecord>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner.channels.get(channel_id).cloned())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn exists(&self, user_id: &str) -> AppResult<bool> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner.users.contains(user_id))
    }
}
