use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::store::ChannelStore;

/// One self-consistent view of a channel's membership, taken at a single
/// point in time. The admin is implicitly a member.
#[derive(Debug, Clone)]
pub struct ChannelMembership {
    pub channel_id: String,
    pub name: String,
    pub admin: String,
    members: Vec<String>,
}

impl ChannelMembership {
    /// Current member ids, admin included, deduplicated.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }
}

/// Read-side resolver from channel id to member list. Membership is owned
/// by the external membership service; each `resolve` call returns one
/// snapshot and never caches across sends.
#[derive(Clone)]
pub struct ChannelResolver {
    channels: Arc<dyn ChannelStore>,
}

impl ChannelResolver {
    pub fn new(channels: Arc<dyn ChannelStore>) -> Self {
        Self { channels }
    }

    pub async fn resolve(&self, channel_id: &str) -> AppResult<ChannelMembership> {
        let record = self
            .channels
            .find_by_id(channel_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Channel {} does not exist", channel_id)))?;

        let mut members = Vec::with_capacity(record.members.len() + 1);
        members.push(record.admin.clone());
        for member in record.members {
            if !members.contains(&member) {
                members.push(member);
            }
        }

        Ok(ChannelMembership {
            channel_id: record.id,
            name: record.name,
            admin: record.admin,
            members,
        })
    }
}
