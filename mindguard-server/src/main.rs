//! MindGuard fusion server - main entry point
//!
//! Starts the sensor monitors, the model loader and the inference loop, then
//! serves the HTTP/SSE API until Ctrl+C or SIGTERM.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mindguard_common::config::{load_toml_config, resolve_config_path, CONFIG_ENV_VAR};
use mindguard_server::api::{self, AppContext};
use mindguard_server::camera::{CameraSource, SnapshotCamera};
use mindguard_server::classifier::{FacialClassifier, HttpFacialClassifier};
use mindguard_server::config::ServiceConfig;
use mindguard_server::frames::FrameProcessor;
use mindguard_server::inference::{load_model, InferenceLoop, ModelSlot};
use mindguard_server::monitors::{AudioLevelMonitor, BiosignalMonitor, FacialAffectMonitor};
use mindguard_server::sse::SseBroadcaster;
use mindguard_server::SharedState;
use tokio::signal;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Monitors get this long to release their devices after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Command-line arguments for mindguard-server
#[derive(Parser, Debug)]
#[command(name = "mindguard-server")]
#[command(about = "Multimodal stress monitoring fusion server")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config)
    #[arg(short, long, env = "MINDGUARD_PORT")]
    port: Option<u16>,

    /// Configuration file
    #[arg(short, long, env = "MINDGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Model artifacts directory (overrides config)
    #[arg(short, long, env = "MINDGUARD_ARTIFACTS")]
    artifacts: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mindguard_server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let mut config: ServiceConfig =
        load_toml_config(config_path.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(artifacts) = args.artifacts {
        config.model.artifacts_dir = artifacts;
    }
    config.validate().context("Invalid configuration")?;

    info!("Starting MindGuard fusion server v{}", env!("CARGO_PKG_VERSION"));

    let shutdown = CancellationToken::new();
    let state = Arc::new(SharedState::new());
    let broadcaster = SseBroadcaster::new(config.server.event_capacity);
    let model: ModelSlot = Arc::new(OnceCell::new());
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    tasks.push(tokio::spawn(load_model(
        config.model.artifacts_dir.clone(),
        Arc::clone(&model),
        Arc::clone(&state),
    )));

    if config.audio.enabled {
        let monitor = AudioLevelMonitor::new(Arc::clone(&state), config.audio.clone());
        tasks.push(tokio::spawn(monitor.run(shutdown.child_token())));
    } else {
        info!("Microphone monitor disabled");
    }

    if config.serial.enabled {
        let monitor = BiosignalMonitor::new(Arc::clone(&state), config.serial.clone(), config.hrv.clone());
        tasks.push(tokio::spawn(monitor.run(shutdown.child_token())));
    } else {
        info!("Heart-rate monitor disabled");
    }

    let classifier: Option<Arc<dyn FacialClassifier>> = match &config.classifier.endpoint {
        Some(endpoint) => match HttpFacialClassifier::new(endpoint, &config.classifier) {
            Ok(client) => {
                info!("Facial classifier at {}", endpoint);
                Some(Arc::new(client) as Arc<dyn FacialClassifier>)
            }
            Err(e) => {
                warn!("Facial classifier unavailable: {}", e);
                None
            }
        },
        None => {
            warn!("No facial classifier endpoint configured, facial analysis disabled");
            None
        }
    };

    match (&classifier, config.camera.enabled) {
        (Some(classifier), true) => {
            let camera = SnapshotCamera::open(&config.camera.snapshot_path)
                .map(|camera| Box::new(camera) as Box<dyn CameraSource>);
            let monitor = FacialAffectMonitor::new(
                Arc::clone(&state),
                Arc::clone(classifier),
                config.tiers.clone(),
                config.camera.interval(),
            );
            tasks.push(tokio::spawn(monitor.run(camera, shutdown.child_token())));
        }
        _ => info!("Camera monitor disabled"),
    }

    let inference = InferenceLoop::new(
        Arc::clone(&state),
        broadcaster.clone(),
        Arc::clone(&model),
        config.features.clone(),
        config.inference.interval(),
        config.inference.idle_retry(),
    );
    tasks.push(tokio::spawn(inference.run(shutdown.child_token())));

    let frames = Arc::new(FrameProcessor::new(
        Arc::clone(&state),
        broadcaster.clone(),
        classifier,
        config.weights.clone(),
        config.frames.no_subject_decay,
    ));

    let ctx = AppContext {
        state,
        broadcaster,
        frames,
    };

    let ip: IpAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind))?;
    let addr = SocketAddr::new(ip, config.server.port);

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let served = api::run(addr, ctx, config.frames.max_body_bytes, shutdown.clone()).await;

    // Stop every task, including after a bind failure
    shutdown.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, futures::future::join_all(tasks))
        .await
        .is_err()
    {
        warn!("Background tasks did not stop within {:?}", SHUTDOWN_GRACE);
    }

    served.context("HTTP server failed")?;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
