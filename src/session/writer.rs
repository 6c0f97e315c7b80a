use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::meta::SessionMeta;
use super::record::{AudioRecord, SessionRecord};
use super::sink::LogSink;
use crate::error::{RecordingError, RecordingResult};

/// Append-only newline-delimited JSON sink for one session
///
/// Every record is flushed before the call returns, so a crash loses at
/// most the record being written. `close` emits the `session-end` record;
/// if the writer is dropped without it, `Drop` makes a synchronous
/// best-effort attempt so the file still terminates predictably.
///
/// A failed write never leaves a partial record in front of the next one:
/// the sink is cut back to the last complete line, or, if that fails, the
/// next record starts on a fresh line.
pub struct SessionLogWriter<W: LogSink = File> {
    path: PathBuf,
    file: Option<W>,
    header_written: bool,
    entries_written: u64,
    /// Bytes of complete, flushed lines
    committed: u64,
    /// A partial line may sit at the end of the sink
    torn: bool,
}

impl SessionLogWriter<File> {
    /// Create a new log file. Fails if `path` already exists.
    pub async fn open(path: impl Into<PathBuf>) -> RecordingResult<Self> {
        let path = path.into();

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| RecordingError::WriterOpen {
                path: path.clone(),
                source,
            })?;

        info!("Opened session log: {}", path.display());

        Ok(Self::from_sink(path, file))
    }
}

impl<W: LogSink> SessionLogWriter<W> {
    /// Wrap an empty sink; `path` is only used in log messages
    pub fn from_sink(path: impl Into<PathBuf>, sink: W) -> Self {
        Self {
            path: path.into(),
            file: Some(sink),
            header_written: false,
            entries_written: 0,
            committed: 0,
            torn: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Write the `session-start` record. Must precede every entry.
    pub async fn write_header(&mut self, meta: &SessionMeta) -> RecordingResult<()> {
        if self.header_written {
            return Err(RecordingError::Io(std::io::Error::other(
                "session header already written",
            )));
        }

        let record = SessionRecord::SessionStart {
            started_at: meta.started_at,
            guild_id: meta.guild_id,
            guild_name: meta.guild_name.clone(),
            channel_id: meta.channel_id,
            channel_name: meta.channel_name.clone(),
        };

        self.write_record(&record).await?;
        self.header_written = true;
        Ok(())
    }

    /// Append one `audio` record and flush it
    pub async fn write_entry(&mut self, record: &AudioRecord) -> RecordingResult<()> {
        if !self.header_written {
            return Err(RecordingError::Io(std::io::Error::other(
                "audio entry written before session header",
            )));
        }

        self.write_record(&SessionRecord::from(record)).await?;
        self.entries_written += 1;
        debug!(
            "Wrote packet to {} ({} bytes)",
            self.path.display(),
            record.payload.len()
        );
        Ok(())
    }

    /// Write `session-end`, flush and release the file. Safe to call twice.
    pub async fn close(&mut self) -> RecordingResult<()> {
        let line = self.frame(&SessionRecord::SessionEnd { ended_at: Utc::now() })?;

        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        file.write_all(&line).await?;
        file.flush().await?;
        file.sync().await?;

        info!(
            "Session written to {} ({} audio records)",
            self.path.display(),
            self.entries_written
        );
        Ok(())
    }

    async fn write_record(&mut self, record: &SessionRecord) -> RecordingResult<()> {
        let line = self.frame(record)?;

        let file = self.file.as_mut().ok_or_else(|| {
            RecordingError::Io(std::io::Error::other("session log already closed"))
        })?;

        let result = match file.write_all(&line).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.committed += line.len() as u64;
                self.torn = false;
                Ok(())
            }
            Err(e) => {
                match file.truncate_to(self.committed).await {
                    Ok(()) => warn!(
                        "Discarded partial record in {} after write failure",
                        self.path.display()
                    ),
                    Err(rewind) => {
                        warn!(
                            "Could not discard partial record in {}: {}",
                            self.path.display(),
                            rewind
                        );
                        self.torn = true;
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Encode one line, starting a fresh line after a torn write
    fn frame(&self, record: &SessionRecord) -> serde_json::Result<Vec<u8>> {
        let mut line = Vec::new();
        if self.torn {
            line.push(b'\n');
        }
        serde_json::to_writer(&mut line, record)?;
        line.push(b'\n');
        Ok(line)
    }
}

impl<W: LogSink> Drop for SessionLogWriter<W> {
    fn drop(&mut self) {
        let line = match self.frame(&SessionRecord::SessionEnd { ended_at: Utc::now() }) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode session end for {}: {}", self.path.display(), e);
                return;
            }
        };

        let Some(file) = self.file.take() else {
            return;
        };

        match file.write_on_drop(&line) {
            Ok(()) => warn!(
                "Session log {} finalized on drop without explicit close",
                self.path.display()
            ),
            Err(e) => warn!(
                "Failed to finalize session log {} on drop: {}",
                self.path.display(),
                e
            ),
        }
    }
}
