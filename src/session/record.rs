use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::voice::{ChannelId, GuildId, UserId};

/// One line of a session log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionRecord {
    #[serde(rename_all = "camelCase")]
    SessionStart {
        started_at: DateTime<Utc>,
        guild_id: GuildId,
        guild_name: String,
        channel_id: ChannelId,
        channel_name: String,
    },

    #[serde(rename_all = "camelCase")]
    Audio {
        received_at: DateTime<Utc>,
        user_id: Option<UserId>,
        user_name: Option<String>,
        /// Base64-encoded raw frame
        audio: String,
    },

    #[serde(rename_all = "camelCase")]
    SessionEnd { ended_at: DateTime<Utc> },
}

/// A received packet after provenance resolution
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRecord {
    pub source_user_id: Option<UserId>,
    pub source_user_name: Option<String>,
    pub received_at: DateTime<Utc>,
    /// Owned copy of the packet payload
    pub payload: Vec<u8>,
}

impl From<&AudioRecord> for SessionRecord {
    fn from(record: &AudioRecord) -> Self {
        SessionRecord::Audio {
            received_at: record.received_at,
            user_id: record.source_user_id,
            user_name: record.source_user_name.clone(),
            audio: base64::engine::general_purpose::STANDARD.encode(&record.payload),
        }
    }
}
