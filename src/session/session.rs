use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::ingest::AudioIngest;
use super::meta::SessionMeta;
use super::sink::LogSink;
use super::stats::{PacketCounters, SessionStats};
use super::writer::SessionLogWriter;
use crate::error::{RecordingError, RecordingResult};
use crate::voice::{IdentityDirectory, SubscriptionId, VoiceConnection};

/// Lifecycle of a recording session. Linear; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Initializing,
    Active,
    Closing,
    Closed,
}

/// One active capture: a voice connection, its packet subscription and the log writer
pub struct RecordingSession<W: LogSink = File> {
    meta: Arc<SessionMeta>,
    state: SessionState,
    connection: Box<dyn VoiceConnection>,
    writer: Arc<Mutex<Option<SessionLogWriter<W>>>>,
    subscription: Option<SubscriptionId>,
    counters: Arc<PacketCounters>,
}

impl RecordingSession<File> {
    /// Open the log, write the header and subscribe to packets
    ///
    /// The connection must already be established. On any failure the
    /// session is torn down (connection included) before the error returns.
    pub async fn start(
        meta: SessionMeta,
        connection: Box<dyn VoiceConnection>,
        identities: Arc<dyn IdentityDirectory>,
    ) -> RecordingResult<Self> {
        let writer = match SessionLogWriter::open(&meta.log_path).await {
            Ok(writer) => writer,
            Err(e) => {
                if let Err(disconnect_err) = connection.disconnect().await {
                    warn!("Failed to disconnect after log open failure: {}", disconnect_err);
                }
                return Err(e);
            }
        };

        Self::start_with_writer(meta, writer, connection, identities).await
    }
}

impl<W: LogSink> RecordingSession<W> {
    /// Same as `start`, over a writer the caller already opened
    pub async fn start_with_writer(
        meta: SessionMeta,
        writer: SessionLogWriter<W>,
        connection: Box<dyn VoiceConnection>,
        identities: Arc<dyn IdentityDirectory>,
    ) -> RecordingResult<Self> {
        info!(
            "Creating recording session {} for channel {} ({})",
            meta.session_id, meta.channel_name, meta.channel_id
        );

        let mut session = Self {
            meta: Arc::new(meta),
            state: SessionState::Initializing,
            connection,
            writer: Arc::new(Mutex::new(Some(writer))),
            subscription: None,
            counters: Arc::new(PacketCounters::default()),
        };

        if let Err(e) = session.initialize(identities).await {
            error!("Failed to initialize recording session: {}", e);
            if let Err(teardown_err) = session.close(Duration::from_secs(5)).await {
                warn!("Teardown after failed initialization: {}", teardown_err);
            }
            return Err(e);
        }

        session.state = SessionState::Active;
        info!("Voice session started in {}", session.meta.channel_name);

        Ok(session)
    }

    async fn initialize(&mut self, identities: Arc<dyn IdentityDirectory>) -> RecordingResult<()> {
        // Header goes first so no audio record can precede it
        {
            let mut guard = self.writer.lock().await;
            if let Some(writer) = guard.as_mut() {
                writer.write_header(&self.meta).await?;
            }
        }

        let ingest = AudioIngest::new(
            Arc::clone(&self.writer),
            self.connection.ssrc_resolver(),
            identities,
            Arc::clone(&self.counters),
        );

        let id = self
            .connection
            .subscribe(Arc::new(ingest))
            .await
            .map_err(|e| RecordingError::JoinFailed(e.context("Failed to subscribe to packets")))?;
        self.subscription = Some(id);

        Ok(())
    }

    pub fn meta(&self) -> &Arc<SessionMeta> {
        &self.meta
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn counters(&self) -> &Arc<PacketCounters> {
        &self.counters
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot(self.meta.started_at)
    }

    /// Tear down: unsubscribe, disconnect, finalize the log
    ///
    /// Transport steps are bounded by `timeout`; the log is always
    /// finalized. Errors from every step are collected and reported
    /// together after the session reaches `Closed`.
    pub async fn close(&mut self, timeout: Duration) -> RecordingResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        self.state = SessionState::Closing;
        info!("Closing recording session {}", self.meta.session_id);

        let deadline = Instant::now() + timeout;
        let mut failures = Vec::new();

        if let Some(id) = self.subscription.take() {
            match tokio::time::timeout_at(deadline, self.connection.unsubscribe(id)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(format!("unsubscribe: {}", e)),
                Err(_) => failures.push("unsubscribe: deadline exceeded".to_string()),
            }
        }

        match tokio::time::timeout_at(deadline, self.connection.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => failures.push(format!("disconnect: {}", e)),
            Err(_) => failures.push("disconnect: deadline exceeded".to_string()),
        }

        {
            let mut guard = self.writer.lock().await;
            if let Some(mut writer) = guard.take() {
                if let Err(e) = writer.close().await {
                    failures.push(format!("finalize log: {}", e));
                }
            }
        }

        self.state = SessionState::Closed;

        if failures.is_empty() {
            info!("Recording session {} closed", self.meta.session_id);
            Ok(())
        } else {
            let message = failures.join("; ");
            error!("Recording session {} closed with errors: {}", self.meta.session_id, message);
            Err(RecordingError::Teardown(message))
        }
    }
}
