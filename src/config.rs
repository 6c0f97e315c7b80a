use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::manager::ManagerSettings;
use crate::transcribe::TranscriptionOptions;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub recording: RecordingConfig,
    pub nats: NatsConfig,
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-recorder".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_dir: String,
    /// Debounce before acting on an empty channel
    pub grace_period_secs: u64,
    pub join_timeout_secs: u64,
    pub stop_timeout_secs: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: "sessions".to_string(),
            grace_period_secs: 15,
            join_timeout_secs: 10,
            stop_timeout_secs: 10,
        }
    }
}

impl RecordingConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub url: String,
    /// Subject prefix shared with the voice gateway bridge
    pub subject_prefix: String,
    /// The bot's own user id, excluded from occupancy
    pub bot_user_id: Option<u64>,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            subject_prefix: "voice".to_string(),
            bot_user_id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub input_path: String,
    pub output_dir: String,
    pub file_extension: String,
    pub overwrite_existing: bool,
    pub skip_completed: bool,
    pub max_parallel: Option<usize>,
    pub stt_subject: String,
    pub request_timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            input_path: String::new(),
            output_dir: "transcripts".to_string(),
            file_extension: "jsonl".to_string(),
            overwrite_existing: false,
            skip_completed: true,
            max_parallel: None,
            stt_subject: "stt.transcribe".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load `path` (any format the config crate understands, optional)
    /// overlaid with `VOICE_RECORDER__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VOICE_RECORDER").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            output_dir: resolve_dir(&self.recording.output_dir),
            join_timeout: Duration::from_secs(self.recording.join_timeout_secs),
            bot_user_id: self.nats.bot_user_id,
        }
    }

    pub fn transcription_options(&self) -> TranscriptionOptions {
        let default_parallel = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        TranscriptionOptions {
            input_path: expand(&self.transcription.input_path),
            output_dir: resolve_dir(&self.transcription.output_dir),
            file_extension: self.transcription.file_extension.clone(),
            overwrite_existing: self.transcription.overwrite_existing,
            skip_completed: self.transcription.skip_completed,
            max_parallel: self.transcription.max_parallel.unwrap_or(default_parallel).max(1),
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Relative directories resolve against the working directory
fn resolve_dir(path: &str) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        return expanded;
    }

    match std::env::current_dir() {
        Ok(cwd) => cwd.join(expanded),
        Err(_) => expanded,
    }
}
