//! Offline Sync Engine (empire-sync) - Main entry point
//!
//! Accepts sync items over HTTP, dispatches them immediately while the
//! upstream is reachable and queues them while it is not.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use empire_common::config::TomlConfig;
use empire_common::events::EventBus;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use empire_sync::probe::ConnectivityProbe;
use empire_sync::processor::SyncProcessor;
use empire_sync::{build_router, AppState, SyncService};

/// Command-line arguments for empire-sync
#[derive(Parser, Debug)]
#[command(name = "empire-sync")]
#[command(about = "Offline sync engine for Empire services")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "EMPIRE_SYNC_PORT")]
    port: Option<u16>,

    /// Path to TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upstream endpoint that receives synced items (overrides config file)
    #[arg(long, env = "EMPIRE_SYNC_UPSTREAM")]
    upstream_url: Option<String>,

    /// Start in offline mode (queue everything until told otherwise)
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::resolve(args.config.as_deref(), "EMPIRE_SYNC_CONFIG", "sync.toml")
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.upstream_url.is_some() {
        config.upstream_url = args.upstream_url.clone();
    }

    // Initialize tracing (RUST_LOG wins over the configured level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "empire_sync={level},empire_common={level},tower_http=info",
                    level = config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Empire Offline Sync (empire-sync) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Queue policy: {:?}", config.queue);

    let processor = SyncProcessor::from_upstream(
        config.upstream_url.as_deref(),
        config.queue.processing_timeout(),
    )
    .context("Failed to create sync processor")?;

    let service = Arc::new(SyncService::new(processor, &config.queue, EventBus::new(256)));

    // Startup initialization failure is not fatal; /health retries it
    if let Err(e) = service.initialize().await {
        error!("Sync service initialization failed: {}", e);
    }

    service.set_ready(!args.offline).await;
    info!("Sync service {}", if args.offline { "offline" } else { "online" });

    if let Some(interval) = config.queue.retry_interval() {
        info!("Retry timer every {:?}", interval);
        let _retry_timer = service.spawn_retry_timer(interval);
    }

    if let (Some(url), Some(ms)) = (config.upstream_url.as_deref(), config.probe_interval_ms) {
        let _probe = ConnectivityProbe::new(url, Duration::from_millis(ms))
            .context("Failed to create connectivity probe")?
            .spawn(Arc::clone(&service));
    }

    let app = build_router(AppState::new(Arc::clone(&service), config.port));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let status = service.status();
    if status.pending_items > 0 {
        info!("Shutting down with {} unsynced items", status.pending_items);
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
