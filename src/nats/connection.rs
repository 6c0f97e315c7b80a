use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::{LeaveMessage, PacketMessage, SpeakingMessage, Subjects};
use crate::voice::{
    ChannelId, GuildId, PacketHandler, SsrcResolver, SubscriptionId, UserId, VoiceConnection,
    VoicePacket,
};

/// SSRC to user mapping announced by the bridge
#[derive(Debug, Default)]
pub struct SsrcMap {
    users: RwLock<HashMap<u32, UserId>>,
}

impl SsrcMap {
    pub fn insert(&self, ssrc: u32, user_id: UserId) {
        self.users.write().insert(ssrc, user_id);
    }
}

impl SsrcResolver for SsrcMap {
    fn user_for_ssrc(&self, ssrc: u32) -> Option<UserId> {
        self.users.read().get(&ssrc).copied()
    }
}

/// Delivery task for one subscription
struct PacketPump {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// A voice connection held open by the gateway bridge
pub struct NatsVoiceConnection {
    client: Client,
    subjects: Subjects,
    guild_id: GuildId,
    channel_id: ChannelId,
    ssrc_map: Arc<SsrcMap>,
    speaking_task: JoinHandle<()>,
    pumps: Mutex<HashMap<SubscriptionId, PacketPump>>,
    next_id: AtomicU64,
}

impl NatsVoiceConnection {
    /// Start tracking SSRC announcements for an already-joined channel
    pub(super) async fn open(
        client: Client,
        subjects: Subjects,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Self> {
        let ssrc_map = Arc::new(SsrcMap::default());

        let mut speaking = client
            .subscribe(subjects.speaking(guild_id))
            .await
            .context("Failed to subscribe to speaking updates")?;

        let map = Arc::clone(&ssrc_map);
        let speaking_task = tokio::spawn(async move {
            while let Some(msg) = speaking.next().await {
                match serde_json::from_slice::<SpeakingMessage>(&msg.payload) {
                    Ok(update) => map.insert(update.ssrc, update.user_id),
                    Err(e) => warn!("Failed to parse speaking message: {}", e),
                }
            }
        });

        Ok(Self {
            client,
            subjects,
            guild_id,
            channel_id,
            ssrc_map,
            speaking_task,
            pumps: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    async fn stop_pump(id: SubscriptionId, pump: PacketPump) {
        let _ = pump.stop.send(());
        if let Err(e) = pump.task.await {
            error!("Packet task for subscription {:?} panicked: {}", id, e);
        }
    }
}

#[async_trait::async_trait]
impl VoiceConnection for NatsVoiceConnection {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn subscribe(&self, handler: Arc<dyn PacketHandler>) -> Result<SubscriptionId> {
        let subject = self.subjects.packets(self.guild_id, self.channel_id);
        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to packets")?;

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            info!("Packet delivery started on {}", subject);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    msg = subscriber.next() => {
                        let Some(msg) = msg else { break };

                        // Handler runs outside the race; a stop waits for it
                        match decode_packet(&msg.payload) {
                            Ok((ssrc, payload)) => {
                                handler.on_packet(VoicePacket { ssrc, payload: &payload }).await;
                            }
                            Err(e) => warn!("Dropping malformed packet on {}: {}", subject, e),
                        }
                    }
                }
            }

            if let Err(e) = subscriber.unsubscribe().await {
                debug!("Unsubscribe from {} failed: {}", subject, e);
            }
            info!("Packet delivery stopped on {}", subject);
        });

        self.pumps.lock().await.insert(
            id,
            PacketPump {
                stop: stop_tx,
                task,
            },
        );

        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let pump = self.pumps.lock().await.remove(&id);
        match pump {
            Some(pump) => {
                Self::stop_pump(id, pump).await;
                Ok(())
            }
            None => anyhow::bail!("Unknown subscription {:?}", id),
        }
    }

    fn ssrc_resolver(&self) -> Arc<dyn SsrcResolver> {
        Arc::clone(&self.ssrc_map) as Arc<dyn SsrcResolver>
    }

    async fn disconnect(&self) -> Result<()> {
        let pumps: Vec<_> = self.pumps.lock().await.drain().collect();
        for (id, pump) in pumps {
            Self::stop_pump(id, pump).await;
        }
        self.speaking_task.abort();

        let leave = LeaveMessage {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
        };
        self.client
            .publish(self.subjects.leave(), serde_json::to_vec(&leave)?.into())
            .await
            .context("Failed to publish leave request")?;
        self.client.flush().await.context("Failed to flush leave request")?;

        info!("Left voice channel {} in guild {}", self.channel_id, self.guild_id);
        Ok(())
    }
}

impl Drop for NatsVoiceConnection {
    fn drop(&mut self) {
        self.speaking_task.abort();
    }
}

/// Decode a packet message into its SSRC and raw frame
pub fn decode_packet(payload: &[u8]) -> Result<(u32, Vec<u8>)> {
    let msg: PacketMessage = serde_json::from_slice(payload).context("Invalid packet JSON")?;
    let frame = base64::engine::general_purpose::STANDARD
        .decode(&msg.audio)
        .context("Invalid base64 audio")?;
    Ok((msg.ssrc, frame))
}
