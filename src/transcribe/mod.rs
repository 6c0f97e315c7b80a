//! Batch rewrite of session logs into transcript logs
//!
//! Each `audio` record's payload is sent to a speech-to-text backend and
//! replaced with `text`/`language`. Every other line is copied verbatim.

mod client;
mod entry;
mod pipeline;

pub use client::{AudioTranscriber, NatsTranscriber, SttReply, SttRequest, TranscriptionResult};
pub use entry::{classify, rewrite, LineAction};
pub use pipeline::{
    resolve_input_files, FileSummary, RunSummary, TranscriptionOptions, TranscriptionPipeline,
};
