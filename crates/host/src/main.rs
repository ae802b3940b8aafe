// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `hakud`: the host coordinator process. Owns the single
//! embedded state store, serves the client/runner HTTP control surface,
//! runs the heartbeat sweep, and proxies SSH sessions to runner-hosted
//! containers.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use fs2::FileExt;
use haku_host::config::Config;
use haku_host::coordinator::Coordinator;
use haku_host::ctx::HostCtx;
use haku_host::dispatcher::Dispatcher;
use haku_host::{heartbeat, http, relay};
use haku_store::Store;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[derive(Debug, Error)]
enum StartupError {
    #[error("could not determine state directory: {0}")]
    Config(#[from] haku_host::config::ConfigError),
    #[error("hakud is already running (lock held at {0})")]
    LockHeld(std::path::PathBuf),
    #[error("failed to open the state store: {0}")]
    Store(#[from] haku_store::StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-v" => {
                println!("hakud {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("hakud {}", env!("CARGO_PKG_VERSION"));
                println!("Host coordinator for a haku cluster. Not meant to be run by hand.");
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
    info!("starting hakud");

    let _lock = match acquire_lock(&config.lock_path) {
        Ok(lock) => lock,
        Err(e) => {
            error!(error = %e, "startup failed");
            return Err(e);
        }
    };

    std::fs::create_dir_all(&config.shared_storage_root)?;
    std::fs::create_dir_all(config.env_archives_dir())?;
    std::fs::create_dir_all(config.task_outputs_dir())?;
    std::fs::create_dir_all(config.task_errors_dir())?;
    if let Some(parent) = config.wal_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = Arc::new(Store::open(&config.wal_path, &config.snapshot_path)?);
    let ctx = HostCtx::new(Arc::clone(&store), config.clone());

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        ctx.http.clone(),
        Arc::new(haku_core::SystemClock),
        &config,
    ));
    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&store),
        Arc::clone(&dispatcher),
        ctx.http.clone(),
        config.clone(),
    ));

    spawn_checkpoint_loop(Arc::clone(&store));
    spawn_flush_loop(Arc::clone(&store));
    tokio::spawn(heartbeat::run_sweep_loop(
        Arc::clone(&store),
        Arc::new(haku_core::SystemClock),
        config.heartbeat_sweep_interval,
        config.heartbeat_timeout,
    ));

    let relay_listener = TcpListener::bind(config.relay_bind.as_str()).await?;
    let relay_actor = Arc::new(relay::Relay::new(Arc::clone(&store)));
    tokio::spawn(relay_actor.run(relay_listener));

    let http_listener = TcpListener::bind(config.http_bind.as_str()).await?;
    let app = http::router(ctx, coordinator);
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, app.into_make_service()).await {
            error!(error = %e, "http server exited");
        }
    });

    println!("READY");
    info!(http_bind = %config.http_bind, relay_bind = %config.relay_bind, "hakud ready");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    server.abort();
    if let Err(e) = store.checkpoint() {
        error!(error = %e, "final checkpoint failed");
    }
    Ok(())
}

fn acquire_lock(lock_path: &Path) -> Result<std::fs::File, StartupError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| StartupError::LockHeld(lock_path.to_path_buf()))?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    Ok(lock_file)
}

fn setup_logging(
    log_path: &Path,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = log_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let file_name = log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("hakud.log"));
    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();
    Ok(guard)
}

const CHECKPOINT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);
const FLUSH_INTERVAL: std::time::Duration = std::time::Duration::from_millis(10);

fn spawn_checkpoint_loop(store: Arc<Store>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CHECKPOINT_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = store.checkpoint() {
                error!(error = %e, "periodic checkpoint failed");
            }
        }
    });
}

fn spawn_flush_loop(store: Arc<Store>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = store.flush_if_needed() {
                error!(error = %e, "wal flush failed");
            }
        }
    });
}
