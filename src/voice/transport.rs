use anyhow::Result;
use std::sync::Arc;

/// Platform identifiers (snowflake-style 64-bit ids)
pub type GuildId = u64;
pub type ChannelId = u64;
pub type UserId = u64;

/// One inbound audio packet as handed over by the transport
///
/// The payload borrows the transport's receive buffer and is only valid
/// for the duration of the handler call.
#[derive(Debug, Clone, Copy)]
pub struct VoicePacket<'a> {
    /// Per-connection source tag (RTP SSRC)
    pub ssrc: u32,
    /// Raw encoded audio frame
    pub payload: &'a [u8],
}

/// Handle returned by `VoiceConnection::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receives inbound packets for one connection
///
/// The transport invokes the handler serially per subscription and awaits
/// each call before delivering the next packet.
#[async_trait::async_trait]
pub trait PacketHandler: Send + Sync {
    async fn on_packet(&self, packet: VoicePacket<'_>);
}

/// Maps packet source tags to user identities
pub trait SsrcResolver: Send + Sync {
    /// Returns `None` while the mapping is stale or not yet known
    fn user_for_ssrc(&self, ssrc: u32) -> Option<UserId>;
}

/// An established voice connection
///
/// Implementations:
/// - NATS: voice gateway bridge running as a separate process
/// - In-memory fakes for tests
#[async_trait::async_trait]
pub trait VoiceConnection: Send + Sync {
    fn guild_id(&self) -> GuildId;

    fn channel_id(&self) -> ChannelId;

    /// Start delivering packets to `handler`
    async fn subscribe(&self, handler: Arc<dyn PacketHandler>) -> Result<SubscriptionId>;

    /// Stop delivering packets; no handler call is in flight once this returns
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Provenance mapping for this connection
    fn ssrc_resolver(&self) -> Arc<dyn SsrcResolver>;

    /// Leave the channel and release the transport
    async fn disconnect(&self) -> Result<()>;
}

/// Establishes voice connections
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Join a voice channel. May hang; callers bound it with a timeout.
    async fn join_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>>;
}
