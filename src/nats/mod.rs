//! NATS adapter for the voice gateway bridge
//!
//! The chat gateway connection lives in a separate bridge process. It
//! answers join requests, streams packets and speaking updates for joined
//! channels, and broadcasts voice state changes. Occupancy snapshots are
//! requested on demand so members who joined before this process started
//! are known.

pub mod client;
pub mod connection;
pub mod messages;
pub mod presence;

pub use client::VoiceBridge;
pub use connection::{decode_packet, NatsVoiceConnection, SsrcMap};
pub use messages::{
    JoinReply, JoinRequest, NameReply, NameRequest, OccupantsReply, OccupantsRequest,
    PacketMessage, PresenceMessage, SpeakingMessage, Subjects, VoiceMember,
};
pub use presence::PresenceCache;
