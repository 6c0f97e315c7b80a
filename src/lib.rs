pub mod config;
pub mod error;
pub mod http;
pub mod manager;
pub mod nats;
pub mod session;
pub mod transcribe;
pub mod voice;

pub use config::Config;
pub use error::{RecordingError, RecordingResult};
pub use http::{create_router, AppState};
pub use manager::{
    ActiveSession, ManagerSettings, OccupancyWatchdog, RecordingManager, StartRequest, StopOutcome,
};
pub use nats::VoiceBridge;
pub use session::{
    AudioIngest, AudioRecord, RecordingSession, SessionLogWriter, SessionMeta, SessionRecord,
    SessionState, SessionStats,
};
pub use transcribe::{
    AudioTranscriber, NatsTranscriber, RunSummary, TranscriptionOptions, TranscriptionPipeline,
    TranscriptionResult,
};
pub use voice::{
    IdentityDirectory, Occupant, PacketHandler, PresenceChange, PresenceDirectory, Transport,
    VoiceConnection, VoicePacket,
};
