use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{RecordingError, RecordingResult};
use crate::session::{PacketCounters, RecordingSession, SessionMeta, SessionStats};
use crate::voice::{ChannelId, GuildId, IdentityDirectory, PresenceDirectory, Transport, UserId};

/// Tunables for the recording manager
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Directory session logs are created in
    pub output_dir: PathBuf,
    /// Upper bound on the transport join
    pub join_timeout: Duration,
    /// The bot's own user id, never counted as an occupant
    pub bot_user_id: Option<UserId>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("sessions"),
            join_timeout: Duration::from_secs(10),
            bot_user_id: None,
        }
    }
}

/// Parameters of a start request
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub requested_by: String,
}

/// Read-only view of the active session, published after start succeeds
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub meta: Arc<SessionMeta>,
    counters: Arc<PacketCounters>,
}

impl ActiveSession {
    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot(self.meta.started_at)
    }
}

/// Result of a stop request
#[derive(Debug, Clone)]
pub enum StopOutcome {
    /// Nothing was recording (or a different session was current)
    Idle,
    /// The session was torn down; `clean` is false if teardown reported errors
    Stopped {
        meta: Arc<SessionMeta>,
        stats: SessionStats,
        clean: bool,
    },
}

impl StopOutcome {
    pub fn stopped(&self) -> bool {
        matches!(self, StopOutcome::Stopped { .. })
    }
}

/// Owns at most one recording session and serializes start/stop
///
/// `gate` is the only path that creates or destroys a session. Status
/// queries read the `active` snapshot and never wait on the gate.
///
/// Start and stop run as spawned tasks that own a handle to the shared
/// state. A caller that stops waiting (client disconnect, timeout) never
/// leaves a joined connection without a session, or a session half closed.
pub struct RecordingManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    transport: Arc<dyn Transport>,
    presence: Arc<dyn PresenceDirectory>,
    identities: Arc<dyn IdentityDirectory>,
    settings: ManagerSettings,
    gate: Mutex<Option<RecordingSession>>,
    active: RwLock<Option<ActiveSession>>,
}

impl RecordingManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        presence: Arc<dyn PresenceDirectory>,
        identities: Arc<dyn IdentityDirectory>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                presence,
                identities,
                settings,
                gate: Mutex::new(None),
                active: RwLock::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    pub fn presence(&self) -> &Arc<dyn PresenceDirectory> {
        &self.inner.presence
    }

    /// Join the channel and start a new session
    ///
    /// The gate is held across the whole sequence, including the join, so
    /// a concurrent start waits and then fails with `AlreadyActive`. The
    /// sequence completes even if the returned future is dropped.
    pub async fn start_recording(&self, request: StartRequest) -> RecordingResult<ActiveSession> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.start(request).await }).await?
    }

    /// Stop the active session, if any
    ///
    /// Idempotent. Transport teardown is bounded by `timeout`; the session
    /// is cleared even when teardown fails or times out.
    pub async fn stop_recording(&self, reason: &str, timeout: Duration) -> StopOutcome {
        self.stop_matching(None, reason, timeout).await
    }

    /// Stop only if `session_id` is still the active session
    pub async fn stop_session(
        &self,
        session_id: Uuid,
        reason: &str,
        timeout: Duration,
    ) -> StopOutcome {
        self.stop_matching(Some(session_id), reason, timeout).await
    }

    async fn stop_matching(
        &self,
        session_id: Option<Uuid>,
        reason: &str,
        timeout: Duration,
    ) -> StopOutcome {
        let inner = Arc::clone(&self.inner);
        let reason = reason.to_string();
        let task =
            tokio::spawn(async move { inner.stop_matching(session_id, &reason, timeout).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Stop task failed: {}", e);
                StopOutcome::Idle
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        self.inner.active.read().is_some()
    }

    pub fn active_channel_id(&self) -> Option<ChannelId> {
        self.inner.active.read().as_ref().map(|a| a.meta.channel_id)
    }

    pub fn active_guild_id(&self) -> Option<GuildId> {
        self.inner.active.read().as_ref().map(|a| a.meta.guild_id)
    }

    pub fn active_session(&self) -> Option<ActiveSession> {
        self.inner.active.read().clone()
    }

    /// True if anyone other than bots (and this bot) is in the active channel
    ///
    /// Lookup failures count as occupied so a flaky directory never ends a
    /// recording.
    pub async fn has_active_members(&self) -> bool {
        let Some(active) = self.active_session() else {
            return false;
        };

        match self
            .inner
            .presence
            .occupants(active.meta.guild_id, active.meta.channel_id)
            .await
        {
            Ok(occupants) => occupants
                .iter()
                .any(|o| !o.is_bot && Some(o.user_id) != self.inner.settings.bot_user_id),
            Err(e) => {
                warn!("Failed to query channel occupants: {}", e);
                true
            }
        }
    }
}

impl ManagerInner {
    async fn start(&self, request: StartRequest) -> RecordingResult<ActiveSession> {
        let mut slot = self.gate.lock().await;
        if slot.is_some() {
            return Err(RecordingError::AlreadyActive);
        }

        let output_dir = &self.settings.output_dir;
        tokio::fs::create_dir_all(output_dir).await?;

        info!(
            "Connecting to voice channel {} in guild {} (requested by {})",
            request.channel_id, request.guild_id, request.requested_by
        );

        let connection = match tokio::time::timeout(
            self.settings.join_timeout,
            self.transport.join_channel(request.guild_id, request.channel_id),
        )
        .await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(RecordingError::JoinFailed(e)),
            Err(_) => return Err(RecordingError::JoinTimeout(self.settings.join_timeout)),
        };

        let guild_name = self
            .identities
            .guild_name(request.guild_id)
            .await
            .unwrap_or_else(|| "unknown".to_string());
        let channel_name = self
            .identities
            .channel_name(request.channel_id)
            .await
            .unwrap_or_else(|| request.channel_id.to_string());

        let meta = SessionMeta::new(
            request.guild_id,
            guild_name,
            request.channel_id,
            channel_name,
            request.requested_by,
            output_dir,
        );

        let session =
            RecordingSession::start(meta, connection, Arc::clone(&self.identities)).await?;

        let active = ActiveSession {
            meta: Arc::clone(session.meta()),
            counters: Arc::clone(session.counters()),
        };
        *slot = Some(session);
        *self.active.write() = Some(active.clone());

        info!("Recording started: {}", active.meta.log_path.display());
        Ok(active)
    }

    async fn stop_matching(
        &self,
        session_id: Option<Uuid>,
        reason: &str,
        timeout: Duration,
    ) -> StopOutcome {
        let mut slot = self.gate.lock().await;

        let matches = match (slot.as_ref(), session_id) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(session), Some(id)) => session.meta().session_id == id,
        };
        if !matches {
            return StopOutcome::Idle;
        }

        let Some(mut session) = slot.take() else {
            return StopOutcome::Idle;
        };
        *self.active.write() = None;

        info!("Stopping recording: {}", reason);

        let clean = match session.close(timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Recording stopped with teardown errors: {}", e);
                false
            }
        };

        StopOutcome::Stopped {
            meta: Arc::clone(session.meta()),
            stats: session.stats(),
            clean,
        }
    }
}
