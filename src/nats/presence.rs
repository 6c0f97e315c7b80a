use parking_lot::RwLock;
use std::collections::HashMap;

use super::messages::{PresenceMessage, VoiceMember};
use crate::voice::{ChannelId, GuildId, Occupant, PresenceChange, UserId};

#[derive(Debug, Clone)]
struct MemberState {
    channel_id: Option<ChannelId>,
    is_bot: bool,
    user_name: Option<String>,
}

/// Voice state and display names, built from presence messages and
/// occupancy snapshots
#[derive(Debug, Default)]
pub struct PresenceCache {
    guilds: RwLock<HashMap<GuildId, HashMap<UserId, MemberState>>>,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a voice state update and return the notification to fan out
    pub fn apply(&self, msg: &PresenceMessage) -> PresenceChange {
        let mut guilds = self.guilds.write();
        let members = guilds.entry(msg.guild_id).or_default();

        let previous_name = members.get(&msg.user_id).and_then(|m| m.user_name.clone());
        members.insert(
            msg.user_id,
            MemberState {
                channel_id: msg.channel_id,
                is_bot: msg.is_bot,
                user_name: msg.user_name.clone().or(previous_name),
            },
        );

        PresenceChange {
            guild_id: msg.guild_id,
            user_id: msg.user_id,
            channel_id: msg.channel_id,
        }
    }

    /// Replace what is known about one channel with an authoritative snapshot
    ///
    /// Members previously seen in the channel but missing from `members` are
    /// marked as out of voice. Known display names are kept when the
    /// snapshot has none.
    pub fn replace_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        members: &[VoiceMember],
    ) {
        let mut guilds = self.guilds.write();
        let known = guilds.entry(guild_id).or_default();

        for state in known.values_mut() {
            if state.channel_id == Some(channel_id) {
                state.channel_id = None;
            }
        }

        for member in members {
            let previous_name = known.get(&member.user_id).and_then(|m| m.user_name.clone());
            known.insert(
                member.user_id,
                MemberState {
                    channel_id: Some(channel_id),
                    is_bot: member.is_bot,
                    user_name: member.user_name.clone().or(previous_name),
                },
            );
        }
    }

    pub fn occupants(&self, guild_id: GuildId, channel_id: ChannelId) -> Vec<Occupant> {
        let guilds = self.guilds.read();
        let Some(members) = guilds.get(&guild_id) else {
            return Vec::new();
        };

        members
            .iter()
            .filter(|(_, state)| state.channel_id == Some(channel_id))
            .map(|(user_id, state)| Occupant {
                user_id: *user_id,
                is_bot: state.is_bot,
            })
            .collect()
    }

    pub fn display_name(&self, user_id: UserId) -> Option<String> {
        self.guilds
            .read()
            .values()
            .find_map(|members| members.get(&user_id).and_then(|m| m.user_name.clone()))
    }
}
