// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host configuration: fixed, XDG-respecting defaults overridable by
//! `HAKU_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine state directory: set HOME or HAKU_STATE_DIR")]
    NoStateDir,
}

/// Host process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. `~/.local/state/haku`).
    pub state_dir: PathBuf,
    /// Path to the lock/PID file, held for the process lifetime.
    pub lock_path: PathBuf,
    /// Path to the host's log file.
    pub log_path: PathBuf,
    /// Path to the write-ahead log.
    pub wal_path: PathBuf,
    /// Path to the periodic checkpoint snapshot.
    pub snapshot_path: PathBuf,
    /// Shared-storage root: environment archives, task logs,
    /// shared data, identical content expected on every node.
    pub shared_storage_root: PathBuf,
    /// Bind address for the HTTP control surface.
    pub http_bind: String,
    /// Bind address for the SSH relay's plain TCP listener.
    pub relay_bind: String,
    /// Heartbeat sweep interval `S`.
    pub heartbeat_sweep_interval: Duration,
    /// Heartbeat timeout `T`; must exceed `3 * H`.
    pub heartbeat_timeout: Duration,
    /// Dispatch retry bound `R`.
    pub dispatch_max_retries: u32,
    /// Backoff ceiling for dispatch retries.
    pub dispatch_backoff_ceiling: Duration,
}

impl Config {
    /// Load configuration from the environment, following the
    /// `HAKU_STATE_DIR` > `XDG_STATE_HOME/haku` > `~/.local/state/haku`
    /// resolution order.
    pub fn load() -> Result<Self, ConfigError> {
        let state_dir = state_dir()?;
        let shared_storage_root = std::env::var("HAKU_SHARED_STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| state_dir.join("shared"));

        Ok(Self {
            lock_path: state_dir.join("hakud.pid"),
            log_path: state_dir.join("hakud.log"),
            wal_path: state_dir.join("wal").join("events.wal"),
            snapshot_path: state_dir.join("snapshot.json"),
            shared_storage_root,
            http_bind: std::env::var("HAKU_HTTP_BIND")
                .unwrap_or_else(|_| "0.0.0.0:7780".to_string()),
            relay_bind: std::env::var("HAKU_RELAY_BIND")
                .unwrap_or_else(|_| "0.0.0.0:7722".to_string()),
            heartbeat_sweep_interval: env_duration_secs("HAKU_HEARTBEAT_SWEEP_SECS", 5),
            heartbeat_timeout: env_duration_secs("HAKU_HEARTBEAT_TIMEOUT_SECS", 30),
            dispatch_max_retries: env_u32("HAKU_DISPATCH_MAX_RETRIES", 5),
            dispatch_backoff_ceiling: env_duration_millis(
                "HAKU_DISPATCH_BACKOFF_CEILING_MS",
                10_000,
            ),
            state_dir,
        })
    }

    pub fn env_archives_dir(&self) -> PathBuf {
        self.shared_storage_root.join("envs")
    }

    pub fn task_outputs_dir(&self) -> PathBuf {
        self.shared_storage_root.join("task_outputs")
    }

    pub fn task_errors_dir(&self) -> PathBuf {
        self.shared_storage_root.join("task_errors")
    }

    pub fn stdout_path(&self, task_id: haku_core::TaskId) -> PathBuf {
        self.task_outputs_dir().join(format!("{task_id}.out"))
    }

    pub fn stderr_path(&self, task_id: haku_core::TaskId) -> PathBuf {
        self.task_errors_dir().join(format!("{task_id}.err"))
    }

    #[cfg(test)]
    pub(crate) fn for_tests(dir: &std::path::Path) -> Self {
        Self {
            state_dir: dir.to_path_buf(),
            lock_path: dir.join("hakud.pid"),
            log_path: dir.join("hakud.log"),
            wal_path: dir.join("wal").join("events.wal"),
            snapshot_path: dir.join("snapshot.json"),
            shared_storage_root: dir.join("shared"),
            http_bind: "127.0.0.1:0".to_string(),
            relay_bind: "127.0.0.1:0".to_string(),
            heartbeat_sweep_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(30),
            dispatch_max_retries: 5,
            dispatch_backoff_ceiling: Duration::from_secs(10),
        }
    }
}

fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("HAKU_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("haku"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/haku"))
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

fn env_duration_millis(key: &str, default_ms: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_ms))
}
