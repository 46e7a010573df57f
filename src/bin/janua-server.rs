// ABOUTME: Server binary: loads configuration, wires resources, and serves the HTTP API
// ABOUTME: Graceful shutdown on SIGINT/SIGTERM
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Janua Identity

use anyhow::{Context, Result};
use clap::Parser;
use janua_server::config::environment::ServerConfig;
use janua_server::logging::{init_logging, LoggingConfig};
use janua_server::resources::ServerResources;
use janua_server::routes;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "janua-server", about = "Janua identity platform server")]
struct Args {
    /// Override the HTTP listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env().context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.http_port = port;
    }

    init_logging(&LoggingConfig::from_env()).context("Failed to initialize logging")?;

    tracing::info!(
        port = config.http_port,
        environment = %config.environment,
        "Starting Janua identity server"
    );

    let resources = ServerResources::new(Arc::new(config.clone()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize server resources: {e}"))?;

    let app = routes::router(Arc::new(resources));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.http_port))?;

    tracing::info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Server shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received ctrl-c, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
