//! # Hierarchical Authorization HTTP Server
//!
//! Serves the routes of [`hierarch_authz::http::router`].
//!
//! ## Configuration
//!
//! Environment variables:
//! - `PORT` - HTTP server port (default: 8080)
//! - `HIERARCH_CONFIG` - Path to a JSON engine configuration (default: built-in)
//! - `HIERARCH_SNAPSHOT` - Path to a JSON graph snapshot loaded at startup
//! - `RUST_LOG` - Log level (default: info)

use anyhow::Context;
use hierarch_authz::{AuthzEngine, EngineConfig, GraphSnapshot};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting hierarchical authorization server v{}", hierarch_authz::VERSION);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let config = match std::env::var("HIERARCH_CONFIG") {
        Ok(path) => EngineConfig::from_file(&path).with_context(|| format!("loading config from {path}"))?,
        Err(_) => EngineConfig::default(),
    };

    info!("Configuration:");
    info!("  Port: {}", port);
    info!("  Bitmap size: {}", config.bitmap_size);
    info!("  Combine with: {:?}", config.combine_with);

    let engine = AuthzEngine::new(config).context("engine initialization failed")?;

    if let Ok(path) = std::env::var("HIERARCH_SNAPSHOT") {
        let snapshot = GraphSnapshot::from_file(&path).with_context(|| format!("reading snapshot {path}"))?;
        engine
            .load_snapshot(snapshot)
            .await
            .with_context(|| format!("loading snapshot {path}"))?;
    }

    let app = hierarch_authz::http::router(Arc::new(engine));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server shut down gracefully");
    Ok(())
}
