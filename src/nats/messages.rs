use serde::{Deserialize, Serialize};

use crate::voice::{ChannelId, GuildId, UserId};

/// Subjects shared with the voice gateway bridge
#[derive(Debug, Clone)]
pub struct Subjects {
    prefix: String,
}

impl Subjects {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Request/reply: join a voice channel
    pub fn join(&self) -> String {
        format!("{}.join", self.prefix)
    }

    /// Publish: leave a voice channel
    pub fn leave(&self) -> String {
        format!("{}.leave", self.prefix)
    }

    /// Inbound audio packets for one channel
    pub fn packets(&self, guild_id: GuildId, channel_id: ChannelId) -> String {
        format!("{}.packets.{}.{}", self.prefix, guild_id, channel_id)
    }

    /// SSRC to user announcements for one guild
    pub fn speaking(&self, guild_id: GuildId) -> String {
        format!("{}.speaking.{}", self.prefix, guild_id)
    }

    /// Voice state updates across all guilds
    pub fn presence_all(&self) -> String {
        format!("{}.presence.>", self.prefix)
    }

    /// Request/reply: guild name lookup
    pub fn guild(&self) -> String {
        format!("{}.guild", self.prefix)
    }

    /// Request/reply: channel name lookup
    pub fn channel(&self) -> String {
        format!("{}.channel", self.prefix)
    }

    /// Request/reply: who is in a voice channel right now
    pub fn occupants(&self) -> String {
        format!("{}.occupants", self.prefix)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinReply {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Published when the recorder leaves; same shape as the join request
pub type LeaveMessage = JoinRequest;

/// One received audio packet
#[derive(Debug, Serialize, Deserialize)]
pub struct PacketMessage {
    pub ssrc: u32,
    /// Base64-encoded raw frame
    pub audio: String,
}

/// Announces which user owns an SSRC
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakingMessage {
    pub ssrc: u32,
    pub user_id: UserId,
}

/// A user's voice state changed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceMessage {
    pub guild_id: GuildId,
    /// `None` when the user left voice
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    pub user_id: UserId,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Asks for a channel's current occupants; same shape as the join request
pub type OccupantsRequest = JoinRequest;

/// One member of an occupancy snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceMember {
    pub user_id: UserId,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub user_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OccupantsReply {
    #[serde(default)]
    pub occupants: Vec<VoiceMember>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NameRequest {
    pub id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NameReply {
    #[serde(default)]
    pub name: Option<String>,
}
