//! Interfaces to the voice platform
//!
//! The recorder never talks to the chat gateway directly. Joining channels,
//! receiving packets, presence and identity lookups all go through these
//! traits so the platform adapter can live elsewhere.

pub mod directory;
pub mod transport;

pub use directory::{IdentityDirectory, Occupant, PresenceChange, PresenceDirectory};
pub use transport::{
    ChannelId, GuildId, PacketHandler, SsrcResolver, SubscriptionId, Transport, UserId,
    VoiceConnection, VoicePacket,
};
