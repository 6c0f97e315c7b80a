use chrono::Utc;
use std::sync::Arc;
use tokio::fs::File;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::record::AudioRecord;
use super::sink::LogSink;
use super::stats::PacketCounters;
use super::writer::SessionLogWriter;
use crate::error::RecordingResult;
use crate::voice::{IdentityDirectory, PacketHandler, SsrcResolver, VoicePacket};

/// Per-session packet callback: resolves provenance, stamps, writes
///
/// Failures never leave this type. A packet that cannot be written is
/// counted as dropped and the session keeps recording.
pub struct AudioIngest<W: LogSink = File> {
    writer: Arc<Mutex<Option<SessionLogWriter<W>>>>,
    resolver: Arc<dyn SsrcResolver>,
    identities: Arc<dyn IdentityDirectory>,
    counters: Arc<PacketCounters>,
}

impl<W: LogSink> AudioIngest<W> {
    pub fn new(
        writer: Arc<Mutex<Option<SessionLogWriter<W>>>>,
        resolver: Arc<dyn SsrcResolver>,
        identities: Arc<dyn IdentityDirectory>,
        counters: Arc<PacketCounters>,
    ) -> Self {
        Self {
            writer,
            resolver,
            identities,
            counters,
        }
    }

    /// Build the owned record. Copies the payload out of the borrowed buffer.
    pub fn build_record(&self, packet: &VoicePacket<'_>) -> AudioRecord {
        let source_user_id = self.resolver.user_for_ssrc(packet.ssrc);
        let source_user_name = source_user_id.and_then(|id| self.identities.display_name(id));

        AudioRecord {
            source_user_id,
            source_user_name,
            received_at: Utc::now(),
            payload: packet.payload.to_vec(),
        }
    }

    async fn forward(&self, record: &AudioRecord) -> RecordingResult<bool> {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => {
                writer.write_entry(record).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl<W: LogSink> PacketHandler for AudioIngest<W> {
    async fn on_packet(&self, packet: VoicePacket<'_>) {
        let record = self.build_record(&packet);

        match self.forward(&record).await {
            Ok(true) => self.counters.record_written(),
            Ok(false) => {
                debug!("Packet from ssrc {} arrived after log was finalized", packet.ssrc);
                self.counters.record_dropped();
            }
            Err(e) => {
                warn!("Failed to write voice packet from ssrc {}: {}", packet.ssrc, e);
                self.counters.record_dropped();
            }
        }
    }
}
