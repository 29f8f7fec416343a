use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::{ChannelRecord, ChannelStore, MessageStore, NewMessage, UserDirectory};
use crate::error::{AppError, AppResult};
use crate::message::{FileAttachment, Message, MessagePayload, MessageTarget, MessageType};

pub type DbPool = Pool<Postgres>;

pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Postgres-backed store. `seq` (BIGSERIAL) records persist completion
/// order and drives all history reads; `sent_at` is the wire timestamp.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    sender: String,
    recipient: Option<String>,
    channel_id: Option<String>,
    message_type: String,
    content: Option<String>,
    file_url: Option<String>,
    file_storage_id: Option<String>,
    file_original_name: Option<String>,
    file_mime_type: Option<String>,
    file_size: Option<i64>,
    sent_at: DateTime<Utc>,
}

const MESSAGE_COLUMNS: &str = "id, sender, recipient, channel_id, message_type, content, \
     file_url, file_storage_id, file_original_name, file_mime_type, file_size, sent_at";

impl MessageRow {
    fn into_message(self) -> AppResult<Message> {
        let target = match (self.recipient, self.channel_id) {
            (Some(recipient), None) => MessageTarget::Direct { recipient },
            (None, Some(channel_id)) => MessageTarget::Channel { channel_id },
            // Unreachable under the messages_one_target constraint.
            _ => {
                return Err(AppError::Internal(format!(
                    "Message {} has an invalid target on record",
                    self.id
                )));
            }
        };

        let message_type = MessageType::from_str(&self.message_type)
            .map_err(AppError::Internal)?;

        let file = match message_type {
            MessageType::File => Some(FileAttachment {
                url: self.file_url.unwrap_or_default(),
                storage_id: self.file_storage_id.unwrap_or_default(),
                original_name: self.file_original_name,
                mime_type: self.file_mime_type,
                size: self.file_size,
            }),
            MessageType::Text => None,
        };

        Ok(Message {
            id: self.id,
            sender: self.sender,
            target,
            payload: MessagePayload {
                message_type,
                content: self.content,
                file,
            },
            timestamp: self.sent_at,
        })
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn create(&self, new: NewMessage) -> AppResult<Message> {
        let (recipient, channel_id) = match &new.target {
            MessageTarget::Direct { recipient } => (Some(recipient.as_str()), None),
            MessageTarget::Channel { channel_id } => (None, Some(channel_id.as_str())),
        };
        let file = new.payload.file.as_ref();

        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            INSERT INTO messages
                (id, sender, recipient, channel_id, message_type, content,
                 file_url, file_storage_id, file_original_name, file_mime_type, file_size)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.sender)
        .bind(recipient)
        .bind(channel_id)
        .bind(new.payload.message_type.as_str())
        .bind(&new.payload.content)
        .bind(file.map(|f| f.url.as_str()))
        .bind(file.map(|f| f.storage_id.as_str()))
        .bind(file.and_then(|f| f.original_name.as_deref()))
        .bind(file.and_then(|f| f.mime_type.as_deref()))
        .bind(file.and_then(|f| f.size))
        .fetch_one(&self.pool)
        .await?;

        row.into_message()
    }

    async fn find_direct(&self, user_a: &str, user_b: &str) -> AppResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE (sender = $1 AND recipient = $2)
               OR (sender = $2 AND recipient = $1)
            ORDER BY seq
            "#
        ))
        .bind(user_a)
        .bind(user_b)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    async fn find_channel(&self, channel_id: &str) -> AppResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE channel_id = $1
            ORDER BY seq
            "#
        ))
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChannelRow {
    id: String,
    name: String,
    admin_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    members: Vec<String>,
}

#[async_trait]
impl ChannelStore for PgStore {
    async fn find_by_id(&self, channel_id: &str) -> AppResult<Option<ChannelRecord>> {
        // Single statement so the snapshot is self-consistent under
        // concurrent membership edits.
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT c.id, c.name, c.admin_id, c.created_at, c.updated_at,
                   COALESCE(
                       array_agg(m.user_id) FILTER (WHERE m.user_id IS NOT NULL),
                       '{}'
                   ) AS members
            FROM channels c
            LEFT JOIN channel_members m ON m.channel_id = c.id
            WHERE c.id = $1
            GROUP BY c.id, c.name, c.admin_id, c.created_at, c.updated_at
            "#,
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ChannelRecord {
            id: r.id,
            name: r.name,
            admin: r.admin_id,
            members: r.members,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }))
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn exists(&self, user_id: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}
