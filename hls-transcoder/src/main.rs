mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hls_transcoder::api::{ApiServer, AppState};
use hls_transcoder::config::{self, AppConfig};
use hls_transcoder::encoder::{EncodeEngine, FfmpegEngine};
use hls_transcoder::logging;
use hls_transcoder::probe::MediaProber;
use hls_transcoder::publish::{DisabledStore, HttpRemoteStore, RemoteStore};
use hls_transcoder::utils::fs;

use crate::cli::{Args, Commands};

/// Upper bound on waiting for killed encoders to report during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let command = args.command.unwrap_or(Commands::Serve);

    // Installed before the config loads so its fallback warnings are visible.
    let log_dir = match command {
        Commands::Serve => config::log_dir_from_env(),
        Commands::Probe { .. } => None,
    };
    let logging_guard = logging::init_logging(log_dir.as_deref())?;
    if let Some(dir) = logging_guard.log_dir() {
        info!(log_dir = %dir.display(), "Writing rolling log files");
    }

    let config = AppConfig::from_env_or_default().context("loading configuration")?;

    match command {
        Commands::Serve => serve(config, logging_guard).await,
        Commands::Probe { file, json } => probe(config, file, json).await,
    }
}

async fn serve(config: AppConfig, logging_guard: logging::LoggingGuard) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    logging_guard.start_retention_cleanup(shutdown.clone());

    fs::ensure_dir_all_with_op("creating upload directory", &config.upload_dir).await?;
    fs::ensure_dir_all_with_op("creating output directory", &config.output_dir).await?;

    let engine = FfmpegEngine::new(config.ffmpeg_path.clone());
    match engine.version() {
        Some(version) => info!(version = %version, "Using ffmpeg"),
        None => warn!(path = %config.ffmpeg_path, "ffmpeg not found; transcodes will fail"),
    }

    if !MediaProber::new(&config.ffprobe_path).is_available() {
        warn!(path = %config.ffprobe_path, "ffprobe not found; probe requests will fail");
    }

    let store: Arc<dyn RemoteStore> = match &config.publish.url {
        Some(url) => {
            info!(url = %url, "Publishing segments to remote store");
            Arc::new(HttpRemoteStore::new(url.clone(), config.publish.timeout()))
        }
        None => {
            warn!("PUBLISH_URL not set; segment publishing disabled");
            Arc::new(DisabledStore)
        }
    };

    let server_config = config.server.clone();
    let state = AppState::from_config(config, Arc::new(engine), store, shutdown.clone())?;
    let orchestrator = state.orchestrator.clone();
    let publisher = state.publisher.clone();
    let server = ApiServer::new(server_config, state, shutdown.clone());

    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        info!("Received Ctrl-C, shutting down");
        ctrl_c_token.cancel();
    });

    let result = server.run().await;

    // Encoders are killed by the cancelled token; give their drivers and
    // in-flight uploads a bounded window to finish reporting.
    shutdown.cancel();
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        orchestrator.shutdown().await;
        publisher.wait_idle().await;
    })
    .await;
    if drained.is_err() {
        warn!("Shutdown grace period elapsed with work still pending");
    }

    info!(stats = ?publisher.stats(), "Stopped");
    result.map_err(Into::into)
}

async fn probe(config: AppConfig, file: std::path::PathBuf, json: bool) -> anyhow::Result<()> {
    let prober = MediaProber::new(&config.ffprobe_path);
    let result = prober
        .probe(&file)
        .await
        .with_context(|| format!("probing {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("file:       {}", result.file);
        println!("format:     {}", result.format);
        match result.duration {
            Some(secs) => println!("duration:   {secs:.2}s"),
            None => println!("duration:   Unknown"),
        }
        println!(
            "video:      {} {} @ {}",
            result.video.codec, result.video.resolution, result.video.bitrate
        );
        println!("audio:      {} @ {}", result.audio.codec, result.audio.bitrate);
    }
    Ok(())
}
