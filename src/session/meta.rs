use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::voice::{ChannelId, GuildId};

/// Descriptive metadata for one recording session, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    /// Unique per session; distinguishes back-to-back sessions in the same channel
    pub session_id: Uuid,
    pub guild_id: GuildId,
    pub guild_name: String,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub requested_by: String,
    pub started_at: DateTime<Utc>,
    pub log_path: PathBuf,
}

impl SessionMeta {
    pub fn new(
        guild_id: GuildId,
        guild_name: String,
        channel_id: ChannelId,
        channel_name: String,
        requested_by: String,
        output_dir: &Path,
    ) -> Self {
        let started_at = Utc::now();
        let log_path = output_dir.join(log_file_name(started_at, &channel_name, &requested_by));

        Self {
            session_id: Uuid::new_v4(),
            guild_id,
            guild_name,
            channel_id,
            channel_name,
            requested_by,
            started_at,
            log_path,
        }
    }
}

/// File name for a session log, e.g. `session_20250301-201500_General_by_alice.jsonl`
pub fn log_file_name(started_at: DateTime<Utc>, channel_name: &str, requested_by: &str) -> String {
    format!(
        "session_{}_{}_by_{}.jsonl",
        started_at.format("%Y%m%d-%H%M%S"),
        sanitize_component(channel_name),
        sanitize_component(requested_by)
    )
}

/// Make a user-supplied name safe to embed in a file name
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());

    for ch in value.chars() {
        let ch = if ch.is_alphanumeric() || ch == '-' || ch == '.' {
            ch
        } else {
            '_'
        };

        if ch == '_' && out.ends_with('_') {
            continue;
        }
        out.push(ch);
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_name_format() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 20, 15, 0).unwrap();
        assert_eq!(
            log_file_name(ts, "General", "alice"),
            "session_20250301-201500_General_by_alice.jsonl"
        );
    }

    #[test]
    fn test_sanitize_replaces_path_characters() {
        assert_eq!(sanitize_component("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_component("Game Night  #1"), "Game_Night_1");
        assert_eq!(sanitize_component("a:b*c?"), "a_b_c");
    }

    #[test]
    fn test_sanitize_empty_becomes_unnamed() {
        assert_eq!(sanitize_component(""), "unnamed");
        assert_eq!(sanitize_component("///"), "unnamed");
        assert_eq!(sanitize_component(".."), "unnamed");
    }

    #[test]
    fn test_meta_log_path_is_inside_output_dir() {
        let meta = SessionMeta::new(
            1,
            "Guild".to_string(),
            42,
            "voice/chat".to_string(),
            "bob".to_string(),
            Path::new("/tmp/sessions"),
        );

        assert_eq!(meta.log_path.parent(), Some(Path::new("/tmp/sessions")));
        let name = meta.log_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("_voice_chat_by_bob.jsonl"));
    }
}
