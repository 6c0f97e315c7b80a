use anyhow::{Context, Result};
use async_nats::Client;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connection::NatsVoiceConnection;
use super::messages::{
    JoinReply, JoinRequest, NameReply, NameRequest, OccupantsReply, OccupantsRequest,
    PresenceMessage, Subjects,
};
use super::presence::PresenceCache;
use crate::voice::{
    ChannelId, GuildId, IdentityDirectory, Occupant, PresenceChange, PresenceDirectory, Transport,
    UserId, VoiceConnection,
};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Client side of the voice gateway bridge
///
/// Implements every platform interface the recorder needs: joining
/// channels, presence, and identity lookups.
pub struct VoiceBridge {
    client: Client,
    subjects: Subjects,
    presence: Arc<PresenceCache>,
    events: broadcast::Sender<PresenceChange>,
    guild_names: RwLock<HashMap<GuildId, String>>,
    channel_names: RwLock<HashMap<ChannelId, String>>,
    presence_task: JoinHandle<()>,
}

impl VoiceBridge {
    /// Connect to NATS and start following presence updates
    pub async fn connect(url: &str, subject_prefix: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        let subjects = Subjects::new(subject_prefix);
        let presence = Arc::new(PresenceCache::new());
        let (events, _) = broadcast::channel(256);

        let mut subscriber = client
            .subscribe(subjects.presence_all())
            .await
            .context("Failed to subscribe to presence updates")?;

        let cache = Arc::clone(&presence);
        let sender = events.clone();
        let presence_task = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<PresenceMessage>(&msg.payload) {
                    Ok(update) => {
                        let change = cache.apply(&update);
                        // No receivers is fine; nothing is recording
                        let _ = sender.send(change);
                    }
                    Err(e) => warn!("Failed to parse presence message: {}", e),
                }
            }
            info!("Presence subscription closed");
        });

        Ok(Self {
            client,
            subjects,
            presence,
            events,
            guild_names: RwLock::new(HashMap::new()),
            channel_names: RwLock::new(HashMap::new()),
            presence_task,
        })
    }

    async fn request<Req: Serialize, Rep: DeserializeOwned>(
        &self,
        subject: String,
        request: &Req,
        timeout: Duration,
    ) -> Result<Rep> {
        let payload = serde_json::to_vec(request)?;

        let pending = self.client.request(subject.clone(), payload.into());
        let message = tokio::time::timeout(timeout, pending)
            .await
            .with_context(|| format!("Request to {} timed out", subject))?
            .with_context(|| format!("Request to {} failed", subject))?;

        serde_json::from_slice(&message.payload)
            .with_context(|| format!("Invalid reply from {}", subject))
    }

    /// Load the bridge's current view of one channel into the presence cache
    pub async fn refresh_occupants(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        let reply: OccupantsReply = self
            .request(
                self.subjects.occupants(),
                &OccupantsRequest {
                    guild_id,
                    channel_id,
                },
                LOOKUP_TIMEOUT,
            )
            .await?;

        debug!(
            "Channel {} in guild {} has {} occupant(s)",
            channel_id,
            guild_id,
            reply.occupants.len()
        );
        self.presence
            .replace_channel(guild_id, channel_id, &reply.occupants);
        Ok(())
    }

    async fn lookup_name(
        &self,
        cache: &RwLock<HashMap<u64, String>>,
        subject: String,
        id: u64,
    ) -> Option<String> {
        let cached = cache.read().get(&id).cloned();
        if cached.is_some() {
            return cached;
        }

        match self
            .request::<_, NameReply>(subject, &NameRequest { id }, LOOKUP_TIMEOUT)
            .await
        {
            Ok(NameReply { name: Some(name) }) => {
                cache.write().insert(id, name.clone());
                Some(name)
            }
            Ok(NameReply { name: None }) => None,
            Err(e) => {
                debug!("Name lookup for {} failed: {:#}", id, e);
                None
            }
        }
    }
}

impl Drop for VoiceBridge {
    fn drop(&mut self) {
        self.presence_task.abort();
    }
}

#[async_trait::async_trait]
impl Transport for VoiceBridge {
    async fn join_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>> {
        // The manager bounds the whole join; this only guards a lost reply
        let reply: JoinReply = self
            .request(
                self.subjects.join(),
                &JoinRequest {
                    guild_id,
                    channel_id,
                },
                Duration::from_secs(60),
            )
            .await?;

        if !reply.ok {
            anyhow::bail!(
                "Bridge refused join: {}",
                reply.error.unwrap_or_else(|| "no reason given".to_string())
            );
        }

        let connection = NatsVoiceConnection::open(
            self.client.clone(),
            self.subjects.clone(),
            guild_id,
            channel_id,
        )
        .await?;

        info!("Joined voice channel {} in guild {}", channel_id, guild_id);

        // Names for members who joined before this process started
        if let Err(e) = self.refresh_occupants(guild_id, channel_id).await {
            warn!("Failed to load occupants of channel {}: {:#}", channel_id, e);
        }
        Ok(Box::new(connection))
    }
}

#[async_trait::async_trait]
impl PresenceDirectory for VoiceBridge {
    /// Deltas alone miss members who joined before startup, so every query
    /// refreshes the channel from the bridge first
    async fn occupants(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Vec<Occupant>> {
        self.refresh_occupants(guild_id, channel_id).await?;
        Ok(self.presence.occupants(guild_id, channel_id))
    }

    fn subscribe(&self) -> broadcast::Receiver<PresenceChange> {
        self.events.subscribe()
    }
}

#[async_trait::async_trait]
impl IdentityDirectory for VoiceBridge {
    fn display_name(&self, user_id: UserId) -> Option<String> {
        self.presence.display_name(user_id)
    }

    async fn guild_name(&self, guild_id: GuildId) -> Option<String> {
        self.lookup_name(&self.guild_names, self.subjects.guild(), guild_id)
            .await
    }

    async fn channel_name(&self, channel_id: ChannelId) -> Option<String> {
        self.lookup_name(&self.channel_names, self.subjects.channel(), channel_id)
            .await
    }
}
