use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::transport::{ChannelId, GuildId, UserId};

/// A user currently connected to a voice channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub user_id: UserId,
    /// Automated account flag as reported by the platform
    pub is_bot: bool,
}

/// Notification that some user's voice state changed in a guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChange {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// Channel the user is now in; `None` when they left voice
    pub channel_id: Option<ChannelId>,
}

/// Live view of who is in which voice channel
#[async_trait::async_trait]
pub trait PresenceDirectory: Send + Sync {
    /// Point-in-time snapshot of a channel's occupants
    async fn occupants(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Vec<Occupant>>;

    /// Push-based stream of presence changes across all guilds
    fn subscribe(&self) -> broadcast::Receiver<PresenceChange>;
}

/// Best-effort, independently cached name lookups
#[async_trait::async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Cached lookup, called on the packet path; must not block
    fn display_name(&self, user_id: UserId) -> Option<String>;

    async fn guild_name(&self, guild_id: GuildId) -> Option<String>;

    async fn channel_name(&self, channel_id: ChannelId) -> Option<String>;
}
