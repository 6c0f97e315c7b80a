use anyhow::{Context, Result};
use base64::Engine;
use serde_json::{Map, Value};

use super::client::TranscriptionResult;

/// What to do with one session log line
#[derive(Debug, PartialEq)]
pub enum LineAction {
    /// Copy the line to the transcript unchanged
    PassThrough,
    /// Transcribe the decoded payload and rewrite the record
    Transcribe {
        record: Map<String, Value>,
        audio: Vec<u8>,
    },
}

/// Decide how a parsed line is handled
///
/// Only `audio` records (case-insensitive) with a non-empty payload are
/// rewritten; everything else passes through.
pub fn classify(line: &str) -> Result<LineAction> {
    let value: Value = serde_json::from_str(line).context("Invalid JSON record")?;

    let Value::Object(record) = value else {
        return Ok(LineAction::PassThrough);
    };

    let is_audio = record
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| t.eq_ignore_ascii_case("audio"));
    if !is_audio {
        return Ok(LineAction::PassThrough);
    }

    let encoded = match record.get("audio").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Ok(LineAction::PassThrough),
    };

    let audio = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .context("Invalid base64 audio payload")?;

    Ok(LineAction::Transcribe { record, audio })
}

/// Drop the payload and attach the transcription, keeping all other fields in order
pub fn rewrite(record: Map<String, Value>, result: TranscriptionResult) -> Value {
    let mut out: Map<String, Value> = record
        .into_iter()
        .filter(|(key, _)| key != "audio" && key != "text" && key != "language")
        .collect();

    out.insert("text".to_string(), Value::String(result.text));
    out.insert(
        "language".to_string(),
        result.language.map(Value::String).unwrap_or(Value::Null),
    );

    Value::Object(out)
}
