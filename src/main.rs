//! Airbar Backend Service
//!
//! Main entry point for the Airbar parcel delivery marketplace backend.
//! This service provides:
//! - REST API for accounts, listings, matches, escrow and wallets
//! - WebSocket server for real-time match and escrow updates
//! - Background sweeper for escrow auto-release and trip expiry

use airbar_backend::cache::CacheService;
use airbar_backend::database::{create_pool, run_migrations};
use airbar_backend::routes::create_router;
use airbar_backend::services::AuditTrailService;
use airbar_backend::{AppConfig, AppState};
use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "airbar_backend={},sqlx=warn,tower_http=info",
            config.log_level
        )
        .into()
    });

    if config.is_production() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()
        .map_err(anyhow::Error::msg)
        .context("Configuration error")?;

    init_tracing(&config);

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Airbar Backend Service Starting                ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("HTTP port: {}", config.http_port);

    // =========================================================================
    // DATABASE SETUP
    // =========================================================================
    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;
    info!("Max connections: {}", config.database.max_connections);

    info!("Running database migrations...");
    run_migrations(&pool, None)
        .await
        .context("Database migration failed")?;
    info!("Database migrations completed successfully");

    // =========================================================================
    // CORE SERVICES
    // =========================================================================
    let cache = CacheService::connect(&config.cache).await;
    info!(
        "✓ Cache backend: {} (connected: {})",
        cache.backend_name(),
        cache.is_connected()
    );

    let audit = AuditTrailService::new(PathBuf::from(&config.audit_log_dir))
        .context("Audit trail initialization failed")?;
    info!("✓ Audit trail service initialized");

    let http_port = config.http_port;
    let ws_port = config.ws_port;
    let environment = config.environment.clone();

    let state = Arc::new(AppState::new(config, pool, cache, audit));
    info!("✓ Application state initialized");

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    let sweeper = state.sweeper();
    let sweeper_handle = tokio::spawn(async move {
        sweeper.start().await;
    });
    info!("✓ Sweeper background task started");

    // =========================================================================
    // START SERVERS
    // =========================================================================
    let http_addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server on {}", http_addr))?;
    let router = create_router(state.clone());

    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("HTTP server error: {}", e);
        }
    });
    info!("✓ HTTP server started on {}", http_addr);

    let ws_handle = if let Some(ws_port) = ws_port {
        let ws_addr = SocketAddr::from(([0, 0, 0, 0], ws_port));
        let listener = TcpListener::bind(ws_addr)
            .await
            .with_context(|| format!("Failed to bind WebSocket server on {}", ws_addr))?;
        let ws_server = state.ws_server.clone();

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        info!("New WebSocket connection from {}", addr);
                        let ws = ws_server.clone();
                        tokio::spawn(async move {
                            if let Err(e) = ws.handle_connection(stream).await {
                                error!("WebSocket connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("WebSocket accept error: {}", e);
                    }
                }
            }
        });

        info!("✓ WebSocket server started on {}", ws_addr);
        Some(handle)
    } else {
        warn!("WS_PORT not configured - WebSocket server not started");
        None
    };

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Airbar Backend Service Ready!                  ║");
    info!("╠══════════════════════════════════════════════════════════╣");
    info!("║  REST API:     0.0.0.0:{}", http_port);
    if let Some(ws_port) = ws_port {
        info!("║  WebSocket:    0.0.0.0:{}", ws_port);
    }
    info!("║  Environment:  {}", environment);
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = http_handle => {
            error!("HTTP server exited unexpectedly");
        }
        _ = sweeper_handle => {
            error!("Sweeper task exited unexpectedly");
        }
        _ = async {
            if let Some(handle) = ws_handle {
                handle.await.ok();
            } else {
                futures::future::pending::<()>().await;
            }
        } => {
            error!("WebSocket server exited unexpectedly");
        }
    }

    info!("Airbar backend service shutdown complete");
    Ok(())
}
