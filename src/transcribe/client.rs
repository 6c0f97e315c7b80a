use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Text recognized in one audio payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Speech-to-text backend used by the batch pipeline
#[async_trait::async_trait]
pub trait AudioTranscriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<TranscriptionResult>;
}

/// Request sent to the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct SttRequest {
    /// Base64-encoded raw frame, exactly as stored in the session log
    pub audio: String,
}

/// Reply from the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct SttReply {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Transcribes by NATS request/reply against an STT worker
pub struct NatsTranscriber {
    client: Client,
    subject: String,
    timeout: Duration,
}

impl NatsTranscriber {
    pub async fn connect(url: &str, subject: String, timeout: Duration) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS, STT requests go to {}", subject);

        Ok(Self {
            client,
            subject,
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl AudioTranscriber for NatsTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<TranscriptionResult> {
        let request = SttRequest {
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
        };
        let payload = serde_json::to_vec(&request)?;

        let message = tokio::time::timeout(
            self.timeout,
            self.client.request(self.subject.clone(), payload.into()),
        )
        .await
        .context("STT request timed out")?
        .context("STT request failed")?;

        let reply: SttReply =
            serde_json::from_slice(&message.payload).context("Invalid STT reply")?;

        if let Some(error) = reply.error {
            anyhow::bail!("STT service error: {}", error);
        }

        debug!("Transcribed {} bytes: {} chars", audio.len(), reply.text.len());

        Ok(TranscriptionResult {
            text: reply.text,
            language: reply.language,
        })
    }
}
