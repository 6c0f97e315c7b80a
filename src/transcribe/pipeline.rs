use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{error, info, warn};

use super::client::AudioTranscriber;
use super::entry::{classify, rewrite, LineAction};

/// Options for one batch run
#[derive(Debug, Clone)]
pub struct TranscriptionOptions {
    /// A session log, or a directory searched recursively
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    /// Extension of session logs when scanning a directory
    pub file_extension: String,
    pub overwrite_existing: bool,
    pub skip_completed: bool,
    /// Files processed concurrently
    pub max_parallel: usize,
}

/// Totals for one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_found: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub records_transcribed: usize,
}

/// Counts for one rewritten file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSummary {
    pub lines_copied: usize,
    pub records_transcribed: usize,
    /// Lines that did not parse and were left out of the transcript
    pub lines_skipped: usize,
    /// True when the log lacked a `session-end` record or its last line was malformed
    pub truncated: bool,
}

enum FileOutcome {
    Processed(FileSummary),
    Skipped,
}

/// Rewrites session logs into transcript logs
pub struct TranscriptionPipeline {
    options: TranscriptionOptions,
    transcriber: Arc<dyn AudioTranscriber>,
}

impl TranscriptionPipeline {
    pub fn new(options: TranscriptionOptions, transcriber: Arc<dyn AudioTranscriber>) -> Self {
        Self {
            options,
            transcriber,
        }
    }

    /// Process every input file with bounded parallelism
    pub async fn run(&self) -> Result<RunSummary> {
        if self.options.input_path.as_os_str().is_empty() {
            anyhow::bail!("transcription.input_path is required");
        }

        let input_path = self.options.input_path.clone();
        let extension = self.options.file_extension.clone();
        let inputs =
            tokio::task::spawn_blocking(move || resolve_input_files(&input_path, &extension))
                .await
                .context("Input scan task failed")??;
        info!("Found {} session file(s) to process", inputs.len());

        fs::create_dir_all(&self.options.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.options.output_dir.display()))?;

        let outcomes: Vec<(PathBuf, Result<FileOutcome>)> = stream::iter(inputs.iter().cloned())
            .map(|input| async move {
                let outcome = self.process_input(&input).await;
                (input, outcome)
            })
            .buffer_unordered(self.options.max_parallel.max(1))
            .collect()
            .await;

        let mut summary = RunSummary {
            files_found: inputs.len(),
            ..Default::default()
        };

        for (input, outcome) in outcomes {
            match outcome {
                Ok(FileOutcome::Processed(file)) => {
                    summary.files_processed += 1;
                    summary.records_transcribed += file.records_transcribed;
                }
                Ok(FileOutcome::Skipped) => summary.files_skipped += 1,
                Err(e) => {
                    error!("Failed to transcribe {}: {:#}", input.display(), e);
                    summary.files_failed += 1;
                }
            }
        }

        info!(
            "Transcription run complete: {} processed, {} skipped, {} failed, {} records",
            summary.files_processed,
            summary.files_skipped,
            summary.files_failed,
            summary.records_transcribed
        );

        Ok(summary)
    }

    async fn process_input(&self, input: &Path) -> Result<FileOutcome> {
        let output = self.output_path(input)?;

        if fs::try_exists(&output).await.unwrap_or(false) {
            if self.options.overwrite_existing {
                info!("Overwriting existing transcript {}", output.display());
            } else if self.options.skip_completed {
                info!("Skipping already processed file {}", output.display());
                return Ok(FileOutcome::Skipped);
            }
        }

        let summary = self.process_file(input, &output).await?;
        Ok(FileOutcome::Processed(summary))
    }

    /// Mirror the input's position under the scanned directory
    fn output_path(&self, input: &Path) -> Result<PathBuf> {
        match input.strip_prefix(&self.options.input_path) {
            Ok(relative) if !relative.as_os_str().is_empty() => {
                Ok(self.options.output_dir.join(relative))
            }
            _ => {
                let file_name = input
                    .file_name()
                    .with_context(|| format!("Input has no file name: {}", input.display()))?;
                Ok(self.options.output_dir.join(file_name))
            }
        }
    }

    /// Rewrite one session log into `output`
    ///
    /// Output is staged in a `.partial` file and renamed on success, so an
    /// interrupted run never leaves a file that looks completed.
    pub async fn process_file(&self, input: &Path, output: &Path) -> Result<FileSummary> {
        info!("Processing session file {}", input.display());

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let staging = staging_path(output);
        let summary = match self.rewrite_log(input, &staging).await {
            Ok(summary) => summary,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&staging).await {
                    warn!("Failed to remove {}: {}", staging.display(), cleanup);
                }
                return Err(e);
            }
        };

        fs::rename(&staging, output)
            .await
            .with_context(|| format!("Failed to move transcript into {}", output.display()))?;

        info!(
            "Wrote {} ({} records transcribed)",
            output.display(),
            summary.records_transcribed
        );

        Ok(summary)
    }

    async fn rewrite_log(&self, input: &Path, staging: &Path) -> Result<FileSummary> {
        let reader = File::open(input)
            .await
            .with_context(|| format!("Failed to open {}", input.display()))?;
        let mut lines = BufReader::new(reader).lines();

        let writer = File::create(staging)
            .await
            .with_context(|| format!("Failed to create {}", staging.display()))?;
        let mut writer = BufWriter::new(writer);

        let mut summary = FileSummary::default();
        let mut saw_end = false;

        // One line of lookahead: a malformed final line means the log was cut off
        let mut pending: Option<(usize, String)> = None;
        let mut line_no = 0usize;

        loop {
            let next = lines
                .next_line()
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let is_last = next.is_none();

            if let Some((number, line)) = pending.take() {
                match classify(&line) {
                    Ok(LineAction::PassThrough) => {
                        saw_end = is_session_end(&line);
                        write_line(&mut writer, &line).await?;
                        summary.lines_copied += 1;
                    }
                    Ok(LineAction::Transcribe { record, audio }) => {
                        saw_end = false;
                        let result = self
                            .transcriber
                            .transcribe(&audio)
                            .await
                            .with_context(|| format!("{}:{}", input.display(), number))?;
                        let rewritten = serde_json::to_string(&rewrite(record, result))?;
                        write_line(&mut writer, &rewritten).await?;
                        summary.records_transcribed += 1;
                    }
                    Err(e) => {
                        warn!(
                            "Skipping malformed line {} in {}: {:#}",
                            number,
                            input.display(),
                            e
                        );
                        summary.lines_skipped += 1;
                        if is_last {
                            summary.truncated = true;
                        }
                    }
                }
            }

            let Some(line) = next else {
                break;
            };
            line_no += 1;
            if !line.trim().is_empty() {
                pending = Some((line_no, line));
            }
        }

        writer.flush().await?;

        if !saw_end {
            warn!(
                "{} has no session-end record; recording was not shut down cleanly",
                input.display()
            );
            summary.truncated = true;
        }

        Ok(summary)
    }
}

/// A file, or every file with `extension` under a directory (recursive, sorted)
pub fn resolve_input_files(input: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    if !input.is_dir() {
        anyhow::bail!("Input path not found: {}", input.display());
    }

    let mut files = Vec::new();
    let mut dirs = vec![input.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
            {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn staging_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn is_session_end(line: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "session-end"))
        .unwrap_or(false)
}

async fn write_line(writer: &mut BufWriter<File>, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}
