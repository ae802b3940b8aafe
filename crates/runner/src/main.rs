// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `hakur`: the per-node runner agent. Detects local
//! topology and GPUs, registers with the host, then serves the runner HTTP
//! control surface and emits heartbeats until terminated.

use std::path::Path;
use std::sync::Arc;

use haku_resource::{DockerEngine, ServiceUnitEngine, SysinfoInventory};
use haku_runner::config::Config;
use haku_runner::ctx::RunnerCtx;
use haku_runner::{heartbeat, http, registration};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] haku_runner::config::ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to connect to the container engine: {0}")]
    Engine(#[from] haku_resource::EngineError),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-v" => {
                println!("hakur {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("hakur {}", env!("CARGO_PKG_VERSION"));
                println!("Runner agent for a haku cluster. Not meant to be run by hand.");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    let _log_guard = setup_logging(&config.log_path)?;
    info!(hostname = %config.hostname, "starting hakur");

    std::fs::create_dir_all(&config.shared_storage_root)?;
    std::fs::create_dir_all(config.env_archives_dir())?;
    std::fs::create_dir_all(config.task_outputs_dir())?;
    std::fs::create_dir_all(config.task_errors_dir())?;

    let engine: Arc<dyn haku_resource::ContainerEngine> = Arc::new(DockerEngine::connect()?);
    let fallback_engine: Arc<dyn haku_resource::ContainerEngine> = Arc::new(ServiceUnitEngine::new());
    let ctx = RunnerCtx::new(engine, fallback_engine, config.clone());

    let inventory: Arc<dyn haku_resource::ResourceInventory> = Arc::new(SysinfoInventory);
    let register_request =
        registration::build_register_request(&config.hostname, &config.endpoint, inventory.as_ref())
            .await
            .map_err(|e| StartupError::Io(std::io::Error::other(e.to_string())))?;
    registration::register_until_accepted(
        &ctx.host_client,
        &config.host_url,
        &register_request,
        config.register_backoff_ceiling,
    )
    .await;

    tokio::spawn(heartbeat::run_heartbeat_loop(
        ctx.host_client.clone(),
        config.host_url.clone(),
        config.hostname.clone(),
        Arc::clone(&inventory),
        config.heartbeat_interval,
    ));

    let http_listener = TcpListener::bind(config.http_bind.as_str()).await?;
    let app = http::router(Arc::clone(&ctx));
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, app.into_make_service()).await {
            error!(error = %e, "http server exited");
        }
    });

    println!("READY");
    info!(http_bind = %config.http_bind, "hakur ready");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    server.abort();
    Ok(())
}

fn setup_logging(
    log_path: &Path,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = log_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let file_name = log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("hakur.log"));
    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();
    Ok(guard)
}
