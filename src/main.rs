//! Chimera Coach - real-time motion coaching
//!
//! # Usage
//!
//! ```bash
//! # Simulated sensors, offline coach
//! cargo run --release -- --offline
//!
//! # Replay a recording against a coaching backend
//! ./chimera-coach --csv session.csv --backend http://coach:8080 --token $TOKEN
//!
//! # Type utterances instead of speaking them
//! ./chimera-coach --offline --stdin
//! ```
//!
//! # Environment Variables
//!
//! - `CHIMERA_CONFIG`: Path to a coach_config.toml
//! - `CHIMERA_BACKEND_TOKEN`: Bearer token for the coaching backend
//! - `CHIMERA_CORS_ORIGINS`: Comma-separated origins allowed by the control API
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use chimera_coach::acquisition::{CsvMotionSource, MotionSource, SimulatedMotionSource};
use chimera_coach::api::{create_app, ApiState};
use chimera_coach::audio::{AudioEngine, ChannelListener, LogSpeaker, SpeechError};
use chimera_coach::config::{self, CoachConfig};
use chimera_coach::perception::HeuristicMotionModel;
use chimera_coach::pipeline::CoachingOrchestrator;
use chimera_coach::protocol::{CoachingClient, HttpCoachingClient, OfflineCoach};
use chimera_coach::types::AudioMode;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "chimera-coach")]
#[command(about = "Real-time multimodal coaching orchestrator")]
#[command(version)]
struct CliArgs {
    /// Path to a coach_config.toml (overrides CHIMERA_CONFIG and ./coach_config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Replay motion samples from a CSV recording instead of simulating them
    #[arg(long, value_name = "PATH")]
    csv: Option<PathBuf>,

    /// Coaching backend base URL (e.g., http://localhost:8080)
    #[arg(long, value_name = "URL", conflicts_with = "offline")]
    backend: Option<String>,

    /// Use the built-in template coach instead of a backend
    #[arg(long)]
    offline: bool,

    /// Bearer token for the coaching backend
    #[arg(long, env = "CHIMERA_BACKEND_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Control API listen address (default: from config, "127.0.0.1:8090")
    #[arg(short, long)]
    addr: Option<String>,

    /// Read utterances from stdin, one per line
    #[arg(long)]
    stdin: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// End the session and exit after this many seconds
    #[arg(long, value_name = "SECS")]
    duration_secs: Option<u64>,
}

/// Identifies which long-running task completed.
#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    Utterances,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::Utterances => write!(f, "Utterances"),
        }
    }
}

// ============================================================================
// Startup
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

/// Load config from `--config` or the standard search order, then apply CLI
/// overrides and re-validate.
fn load_config(args: &CliArgs) -> Result<CoachConfig> {
    let mut config = match &args.config {
        Some(path) => CoachConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CoachConfig::load(),
    };

    if let Some(url) = &args.backend {
        config.backend.base_url = url.clone();
        config.backend.offline = false;
    }
    if args.offline {
        config.backend.offline = true;
    }
    if let Some(token) = &args.token {
        config.backend.bearer_token = token.clone();
    }
    if let Some(addr) = &args.addr {
        config.server.addr = addr.clone();
    }

    config.validate().context("Invalid configuration after CLI overrides")?;
    Ok(config)
}

fn build_source(args: &CliArgs, config: &CoachConfig) -> Result<Arc<dyn MotionSource>> {
    match &args.csv {
        Some(path) => {
            let source = CsvMotionSource::load(path, config.sensors.replay_speed)
                .with_context(|| format!("Failed to load motion recording {}", path.display()))?;
            info!(samples = source.len(), speed = config.sensors.replay_speed, "Input: CSV replay");
            Ok(Arc::new(source))
        }
        None => {
            info!(rate_hz = config.sensors.inertial_rate_hz, "Input: simulated motion");
            Ok(Arc::new(SimulatedMotionSource::new(config.sensors.clone())))
        }
    }
}

fn build_client(config: &CoachConfig) -> Result<Arc<dyn CoachingClient>> {
    if config.backend.offline {
        info!("Coach: offline templates");
        return Ok(Arc::new(OfflineCoach::new()));
    }
    let client = HttpCoachingClient::new(&config.backend)
        .context("Failed to build coaching backend client")?;
    info!(endpoint = client.endpoint(), "Coach: remote backend");
    Ok(Arc::new(client))
}

// ============================================================================
// Tasks
// ============================================================================

fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await
            .context("HTTP server error")?;
        info!("[HttpServer] Graceful shutdown complete");
        Ok(TaskName::HttpServer)
    });
}

/// Feed stdin lines to the recognizer and open one listening window per line.
/// A line that arrives while the coach is speaking waits for audio to go idle.
fn spawn_utterance_reader(
    task_set: &mut JoinSet<Result<TaskName>>,
    orchestrator: CoachingOrchestrator,
    transcripts: mpsc::Sender<String>,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[Utterances] Reading utterances from stdin");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut audio = orchestrator.subscribe_audio();

        loop {
            let line = tokio::select! {
                () = cancel_token.cancelled() => break,
                line = lines.next_line() => line.context("Failed to read stdin")?,
            };
            let Some(line) = line else {
                info!("[Utterances] stdin closed");
                break;
            };
            if transcripts.send(line).await.is_err() {
                break;
            }

            loop {
                match orchestrator.listen_for_command().await {
                    Ok(outcome) => {
                        info!(?outcome, "[Utterances] Handled");
                        break;
                    }
                    Err(SpeechError::Busy(conflict)) => {
                        debug!(%conflict, "[Utterances] Audio busy, waiting for idle");
                        tokio::select! {
                            () = cancel_token.cancelled() => return Ok(TaskName::Utterances),
                            idle = async { audio.wait_for(|m| *m == AudioMode::Idle).await.is_ok() } => {
                                if !idle {
                                    return Ok(TaskName::Utterances);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "[Utterances] Listening failed");
                        break;
                    }
                }
            }
        }
        Ok(TaskName::Utterances)
    });
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.json_logs);

    info!("Chimera Coach v{}", env!("CARGO_PKG_VERSION"));

    let coach_config = load_config(&args)?;
    config::init(coach_config);
    let config = config::get();

    let source = build_source(&args, config)?;
    let client = build_client(config)?;
    let (listener, transcripts) = ChannelListener::new(16);
    let audio = AudioEngine::new(
        Arc::new(LogSpeaker::new(config.speech.clone())),
        Arc::new(listener),
    );
    let orchestrator = CoachingOrchestrator::new(
        config,
        source,
        Arc::new(HeuristicMotionModel::new()),
        client,
        audio,
    );

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    let duration = args.duration_secs.map(Duration::from_secs);
    tokio::spawn(async move {
        match duration {
            Some(d) => tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                () = tokio::time::sleep(d) => info!(secs = d.as_secs(), "Session duration elapsed, shutting down"),
            },
            None => {
                tokio::signal::ctrl_c().await.ok();
                info!("Received Ctrl+C, shutting down");
            }
        }
        shutdown_token.cancel();
    });

    let server_addr = config.server.addr.as_str();
    let tcp = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server_addr))?;
    info!("Control API listening on http://{}", server_addr);

    let mut task_set = JoinSet::new();
    spawn_http_server(
        &mut task_set,
        tcp,
        create_app(ApiState::new(orchestrator.clone())),
        cancel_token.clone(),
    );
    if args.stdin {
        spawn_utterance_reader(&mut task_set, orchestrator.clone(), transcripts, cancel_token.clone());
    } else {
        drop(transcripts);
    }

    orchestrator.start_session();

    cancel_token.cancelled().await;
    orchestrator.end_session();

    while let Some(joined) = task_set.join_next().await {
        match joined {
            Ok(Ok(name)) => debug!("[{}] Task finished", name),
            Ok(Err(e)) => error!(error = %e, "Task failed"),
            Err(e) => error!(error = %e, "Task panicked"),
        }
    }

    info!(stats = %orchestrator.stats(), "Chimera Coach shutdown complete");
    Ok(())
}
