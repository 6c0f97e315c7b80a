// In-memory stand-ins for the voice platform
//
// FakeTransport hands out FakeConnections that tests drive directly with
// `deliver`. FakePresence and FakeIdentity are plain maps. FlakySink is an
// in-memory log sink that can be told to fail halfway through a write.

#![allow(dead_code)]

use anyhow::Result;
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::broadcast;

use voice_recorder::session::{LogSink, SessionRecord};
use voice_recorder::voice::{
    ChannelId, GuildId, IdentityDirectory, Occupant, PacketHandler, PresenceChange,
    PresenceDirectory, SsrcResolver, SubscriptionId, Transport, UserId, VoiceConnection,
    VoicePacket,
};
use voice_recorder::{ManagerSettings, RecordingManager};

#[derive(Default)]
pub struct ConnectionLog {
    pub joins: AtomicUsize,
    pub subscribes: AtomicUsize,
    pub unsubscribes: AtomicUsize,
    pub disconnects: AtomicUsize,
}

pub struct StaticSsrcMap(pub HashMap<u32, UserId>);

impl SsrcResolver for StaticSsrcMap {
    fn user_for_ssrc(&self, ssrc: u32) -> Option<UserId> {
        self.0.get(&ssrc).copied()
    }
}

pub struct FakeConnection {
    guild_id: GuildId,
    channel_id: ChannelId,
    handler: Mutex<Option<(SubscriptionId, Arc<dyn PacketHandler>)>>,
    ssrc_map: Arc<StaticSsrcMap>,
    log: Arc<ConnectionLog>,
    disconnect_delay: Option<Duration>,
    fail_subscribe: bool,
}

impl FakeConnection {
    /// Deliver one packet the way a transport does: await the handler
    pub async fn deliver(&self, ssrc: u32, payload: &[u8]) -> bool {
        let handler = self
            .handler
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, h)| Arc::clone(h));

        match handler {
            Some(handler) => {
                // Transient buffer, gone once the callback returns
                let buffer = payload.to_vec();
                handler.on_packet(VoicePacket { ssrc, payload: &buffer }).await;
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl VoiceConnection for FakeConnection {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn subscribe(&self, handler: Arc<dyn PacketHandler>) -> Result<SubscriptionId> {
        if self.fail_subscribe {
            anyhow::bail!("packet stream unavailable");
        }
        self.log.subscribes.fetch_add(1, Ordering::SeqCst);
        let id = SubscriptionId(1);
        *self.handler.lock().unwrap() = Some((id, handler));
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.log.unsubscribes.fetch_add(1, Ordering::SeqCst);
        let mut handler = self.handler.lock().unwrap();
        if handler.as_ref().map(|(current, _)| *current) == Some(id) {
            *handler = None;
        }
        Ok(())
    }

    fn ssrc_resolver(&self) -> Arc<dyn SsrcResolver> {
        Arc::clone(&self.ssrc_map) as Arc<dyn SsrcResolver>
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(delay) = self.disconnect_delay {
            tokio::time::sleep(delay).await;
        }
        self.log.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Behaviour knobs for the fake transport
#[derive(Clone, Default)]
pub struct TransportBehaviour {
    pub join_delay: Option<Duration>,
    pub fail_join: bool,
    pub fail_subscribe: bool,
    pub disconnect_delay: Option<Duration>,
}

pub struct FakeTransport {
    pub log: Arc<ConnectionLog>,
    pub ssrc_map: HashMap<u32, UserId>,
    pub behaviour: TransportBehaviour,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeTransport {
    pub fn new(ssrc_map: HashMap<u32, UserId>, behaviour: TransportBehaviour) -> Self {
        Self {
            log: Arc::new(ConnectionLog::default()),
            ssrc_map,
            behaviour,
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Most recently joined connection
    pub fn connection(&self) -> Arc<FakeConnection> {
        self.connections
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection joined")
    }
}

/// Boxed view of a shared connection so the test keeps a handle
struct SharedConnection(Arc<FakeConnection>);

#[async_trait::async_trait]
impl VoiceConnection for SharedConnection {
    fn guild_id(&self) -> GuildId {
        self.0.guild_id()
    }

    fn channel_id(&self) -> ChannelId {
        self.0.channel_id()
    }

    async fn subscribe(&self, handler: Arc<dyn PacketHandler>) -> Result<SubscriptionId> {
        self.0.subscribe(handler).await
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.0.unsubscribe(id).await
    }

    fn ssrc_resolver(&self) -> Arc<dyn SsrcResolver> {
        self.0.ssrc_resolver()
    }

    async fn disconnect(&self) -> Result<()> {
        self.0.disconnect().await
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn join_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>> {
        if let Some(delay) = self.behaviour.join_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behaviour.fail_join {
            anyhow::bail!("voice server unavailable");
        }

        self.log.joins.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(FakeConnection {
            guild_id,
            channel_id,
            handler: Mutex::new(None),
            ssrc_map: Arc::new(StaticSsrcMap(self.ssrc_map.clone())),
            log: Arc::clone(&self.log),
            disconnect_delay: self.behaviour.disconnect_delay,
            fail_subscribe: self.behaviour.fail_subscribe,
        });
        self.connections.lock().unwrap().push(Arc::clone(&connection));

        Ok(Box::new(SharedConnection(connection)))
    }
}

pub struct FakePresence {
    occupants: Mutex<HashMap<(GuildId, ChannelId), Vec<Occupant>>>,
    events: broadcast::Sender<PresenceChange>,
}

impl FakePresence {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            occupants: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn set_occupants(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        occupants: Vec<Occupant>,
    ) {
        self.occupants
            .lock()
            .unwrap()
            .insert((guild_id, channel_id), occupants);
    }

    /// Update occupancy and push the matching notification
    pub fn change(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        user_id: UserId,
        occupants: Vec<Occupant>,
    ) -> PresenceChange {
        self.set_occupants(guild_id, channel_id, occupants);
        let change = PresenceChange {
            guild_id,
            user_id,
            channel_id: Some(channel_id),
        };
        let _ = self.events.send(change.clone());
        change
    }
}

#[async_trait::async_trait]
impl PresenceDirectory for FakePresence {
    async fn occupants(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Vec<Occupant>> {
        Ok(self
            .occupants
            .lock()
            .unwrap()
            .get(&(guild_id, channel_id))
            .cloned()
            .unwrap_or_default())
    }

    fn subscribe(&self) -> broadcast::Receiver<PresenceChange> {
        self.events.subscribe()
    }
}

pub struct FakeIdentity {
    pub users: HashMap<UserId, String>,
    /// Delay before answering guild and channel lookups
    pub name_delay: Option<Duration>,
}

impl FakeIdentity {
    pub fn new(users: HashMap<UserId, String>) -> Self {
        Self {
            users,
            name_delay: None,
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.name_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl IdentityDirectory for FakeIdentity {
    fn display_name(&self, user_id: UserId) -> Option<String> {
        self.users.get(&user_id).cloned()
    }

    async fn guild_name(&self, _guild_id: GuildId) -> Option<String> {
        self.pause().await;
        Some("Game Night".to_string())
    }

    async fn channel_name(&self, _channel_id: ChannelId) -> Option<String> {
        self.pause().await;
        Some("General".to_string())
    }
}

#[derive(Default)]
struct SinkState {
    bytes: Vec<u8>,
    fail_next_write: bool,
    half_written: bool,
    fail_truncate: bool,
}

/// In-memory log sink shared with the test through clones
#[derive(Clone, Default)]
pub struct FlakySink {
    state: Arc<Mutex<SinkState>>,
}

impl FlakySink {
    /// The next write stores half of its buffer, then fails
    pub fn fail_next_write(&self) {
        self.state.lock().unwrap().fail_next_write = true;
    }

    /// Rewinding after a failed write fails too
    pub fn fail_truncate(&self) {
        self.state.lock().unwrap().fail_truncate = true;
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.state.lock().unwrap().bytes.clone()).unwrap()
    }
}

impl AsyncWrite for FlakySink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state.lock().unwrap();
        if state.half_written {
            state.half_written = false;
            return Poll::Ready(Err(io::Error::other("disk full")));
        }
        if state.fail_next_write {
            state.fail_next_write = false;
            state.half_written = true;
            let half = buf.len() / 2;
            state.bytes.extend_from_slice(&buf[..half]);
            return Poll::Ready(Ok(half));
        }
        state.bytes.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait::async_trait]
impl LogSink for FlakySink {
    async fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_truncate {
            return Err(io::Error::other("truncate not permitted"));
        }
        state.bytes.truncate(len as usize);
        Ok(())
    }

    fn write_on_drop(self, bytes: &[u8]) -> io::Result<()> {
        self.state.lock().unwrap().bytes.extend_from_slice(bytes);
        Ok(())
    }
}

pub fn human(user_id: UserId) -> Occupant {
    Occupant {
        user_id,
        is_bot: false,
    }
}

pub fn bot(user_id: UserId) -> Occupant {
    Occupant {
        user_id,
        is_bot: true,
    }
}

/// Manager wired to fakes: ssrc 100 -> user 7 (alice), ssrc 200 -> user 9 (bob)
pub struct Harness {
    pub manager: Arc<RecordingManager>,
    pub transport: Arc<FakeTransport>,
    pub presence: Arc<FakePresence>,
}

impl Harness {
    pub fn new(output_dir: &std::path::Path, behaviour: TransportBehaviour) -> Self {
        Self::with_settings(
            ManagerSettings {
                output_dir: output_dir.to_path_buf(),
                join_timeout: Duration::from_secs(2),
                bot_user_id: Some(1000),
            },
            behaviour,
        )
    }

    pub fn with_settings(settings: ManagerSettings, behaviour: TransportBehaviour) -> Self {
        Self::build(settings, behaviour, None)
    }

    /// Guild and channel lookups each take `delay`
    pub fn with_slow_names(output_dir: &std::path::Path, delay: Duration) -> Self {
        Self::build(
            ManagerSettings {
                output_dir: output_dir.to_path_buf(),
                join_timeout: Duration::from_secs(2),
                bot_user_id: Some(1000),
            },
            TransportBehaviour::default(),
            Some(delay),
        )
    }

    fn build(
        settings: ManagerSettings,
        behaviour: TransportBehaviour,
        name_delay: Option<Duration>,
    ) -> Self {
        let transport = Arc::new(FakeTransport::new(
            HashMap::from([(100, 7), (200, 9)]),
            behaviour,
        ));
        let presence = Arc::new(FakePresence::new());
        let mut identity = FakeIdentity::new(HashMap::from([
            (7, "alice".to_string()),
            (9, "bob".to_string()),
        ]));
        identity.name_delay = name_delay;
        let identity = Arc::new(identity);

        let manager = Arc::new(RecordingManager::new(
            transport.clone(),
            presence.clone(),
            identity,
            settings,
        ));

        Self {
            manager,
            transport,
            presence,
        }
    }
}

/// Parse every line of a session log
pub fn read_log(path: &std::path::Path) -> Vec<SessionRecord> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
