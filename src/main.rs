use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voice_recorder::{
    create_router, AppState, Config, NatsTranscriber, OccupancyWatchdog, PresenceDirectory,
    RecordingManager, StopOutcome, TranscriptionPipeline, VoiceBridge,
};

#[derive(Parser)]
#[command(name = "voice-recorder", about = "Voice channel session recorder")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, global = true, default_value = "config/voice-recorder")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the recorder service
    Record,

    /// Rewrite session logs into transcripts
    Transcribe {
        /// Session log or directory of logs
        #[arg(long)]
        input: Option<PathBuf>,

        /// Directory for transcript logs
        #[arg(long)]
        output: Option<PathBuf>,

        /// Rewrite transcripts that already exist
        #[arg(long)]
        overwrite: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Record => record(cfg).await,
        Command::Transcribe {
            input,
            output,
            overwrite,
        } => transcribe(cfg, input, output, overwrite).await,
    }
}

async fn record(cfg: Config) -> Result<()> {
    let bridge = Arc::new(VoiceBridge::connect(&cfg.nats.url, &cfg.nats.subject_prefix).await?);

    let settings = cfg.manager_settings();
    info!("Session logs will be written to {}", settings.output_dir.display());

    let manager = Arc::new(RecordingManager::new(
        bridge.clone(),
        bridge.clone(),
        bridge.clone(),
        settings,
    ));

    let stop_timeout = cfg.recording.stop_timeout();
    let watchdog = OccupancyWatchdog::new(
        Arc::clone(&manager),
        cfg.recording.grace_period(),
        stop_timeout,
    )
    .spawn(bridge.subscribe());

    let app = create_router(AppState::new(Arc::clone(&manager), stop_timeout));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP control API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
        .context("HTTP server failed")?;

    watchdog.abort();

    match manager.stop_recording("shutdown", stop_timeout).await {
        StopOutcome::Stopped { meta, stats, .. } => info!(
            "Recording saved to {} ({} packets)",
            meta.log_path.display(),
            stats.packets_written
        ),
        StopOutcome::Idle => info!("No active recording at shutdown"),
    }

    Ok(())
}

async fn transcribe(
    cfg: Config,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    overwrite: bool,
) -> Result<()> {
    let mut options = cfg.transcription_options();
    if let Some(input) = input {
        options.input_path = input;
    }
    if let Some(output) = output {
        options.output_dir = output;
    }
    options.overwrite_existing |= overwrite;

    let transcriber = NatsTranscriber::connect(
        &cfg.nats.url,
        cfg.transcription.stt_subject.clone(),
        Duration::from_secs(cfg.transcription.request_timeout_secs),
    )
    .await?;

    let summary = TranscriptionPipeline::new(options, Arc::new(transcriber))
        .run()
        .await?;

    if summary.files_failed > 0 {
        anyhow::bail!("{} session file(s) failed to transcribe", summary.files_failed);
    }

    info!("Transcription completed successfully.");
    Ok(())
}
