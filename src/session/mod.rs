//! Recording session management
//!
//! This module provides the `RecordingSession` abstraction that manages:
//! - The append-only session log (header, audio records, footer)
//! - Per-packet ingestion from the voice connection
//! - Session statistics and lifecycle state

mod ingest;
mod meta;
mod record;
mod session;
mod sink;
mod stats;
mod writer;

pub use ingest::AudioIngest;
pub use meta::{log_file_name, sanitize_component, SessionMeta};
pub use record::{AudioRecord, SessionRecord};
pub use session::{RecordingSession, SessionState};
pub use sink::LogSink;
pub use stats::{PacketCounters, SessionStats};
pub use writer::SessionLogWriter;
