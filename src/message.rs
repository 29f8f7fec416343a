use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

// ============================================================================
// Domain model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    File,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::File => "file",
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "file" => Ok(MessageType::File),
            _ => Err(format!("Unknown message type: {}", s)),
        }
    }
}

/// Descriptor of an already-uploaded file. The bytes themselves live with
/// the external storage integration; only this metadata travels here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub url: String,
    pub storage_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

/// Message body as submitted by a client: type plus the matching content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
}

impl MessagePayload {
    /// Enforces the type/content invariant: content is present iff the
    /// message is text, a file descriptor is present iff it is a file.
    /// Runs once at the router boundary, before persistence or dispatch.
    pub fn validate(&self) -> AppResult<()> {
        match self.message_type {
            MessageType::Text => {
                match &self.content {
                    Some(content) if !content.trim().is_empty() => {}
                    _ => {
                        return Err(AppError::Validation(
                            "Text messages require non-empty content".to_string(),
                        ));
                    }
                }
                if self.file.is_some() {
                    return Err(AppError::Validation(
                        "Text messages must not carry a file descriptor".to_string(),
                    ));
                }
            }
            MessageType::File => {
                let file = self.file.as_ref().ok_or_else(|| {
                    AppError::Validation("File messages require a file descriptor".to_string())
                })?;
                if file.url.trim().is_empty() || file.storage_id.trim().is_empty() {
                    return Err(AppError::Validation(
                        "File descriptor requires url and storageId".to_string(),
                    ));
                }
                if self.content.is_some() {
                    return Err(AppError::Validation(
                        "File messages must not carry text content".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Where a message is addressed. The two-variant shape makes "exactly one
/// of recipient / channelId" unrepresentable to violate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageTarget {
    Direct { recipient: String },
    #[serde(rename_all = "camelCase")]
    Channel { channel_id: String },
}

/// A persisted message. `id` and `timestamp` are assigned by the store at
/// persist time; the struct is immutable from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender: String,
    #[serde(flatten)]
    pub target: MessageTarget,
    #[serde(flatten)]
    pub payload: MessagePayload,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Wire frames (JSON text over the WebSocket)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectSendRequest {
    pub sender: String,
    pub recipient: String,
    #[serde(flatten)]
    pub payload: MessagePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSendRequest {
    pub sender: String,
    pub channel_id: String,
    #[serde(flatten)]
    pub payload: MessagePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientFrame {
    Connect {
        token: String,
    },
    DirectSend(DirectSendRequest),
    ChannelSend(ChannelSendRequest),
    DirectHistory {
        peer: String,
    },
    #[serde(rename_all = "camelCase")]
    ChannelHistory {
        channel_id: String,
    },
    Logout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    Connected { user_id: String },
    /// A dispatched message, pushed to every live connection in the
    /// resolved recipient set.
    Message(Message),
    /// Acknowledgement to the sender carrying the persisted id/timestamp.
    #[serde(rename_all = "camelCase")]
    Sent {
        message_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    /// History fetch response, ascending persist order.
    History { messages: Vec<Message> },
    Error { code: String, message: String },
}
