#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use server::config::{CliArgs, ServerConfig};
use server::service::{coordinator::Coordinator, handler::router};
use server::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry(config.log_format)?;

    let generator = Arc::new(config.generator.build());
    let coordinator = Arc::new(Coordinator::new(&config, generator));
    coordinator.prepare().await?;

    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config, &coordinator);

    axum::serve(listener, router(coordinator, config.max_upload_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(config: &ServerConfig, coordinator: &Coordinator) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting upload service on {} with full config: {:#?}",
            config.server_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting upload service on {}, generator writes to {}",
            config.server_addr,
            coordinator.pending_path().display()
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    // In-flight uploads finish before the listener closes; a request still
    // holding the lock runs to completion or timeout.
    tracing::info!("Shutdown signal received, terminating gracefully...");
}
