// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner configuration: fixed defaults overridable by `HAKU_*` environment
//! variables.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a hostname: set HAKU_HOSTNAME")]
    NoHostname,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// This runner's advertised hostname.
    pub hostname: String,
    /// Address the host can reach this runner's HTTP surface on.
    pub endpoint: String,
    /// Bind address for the runner's own HTTP control surface.
    pub http_bind: String,
    /// Base URL of the host coordinator.
    pub host_url: String,
    /// Shared-storage root, identical content expected on every node.
    pub shared_storage_root: PathBuf,
    /// Path to the runner's log file.
    pub log_path: PathBuf,
    /// Heartbeat interval `H`.
    pub heartbeat_interval: Duration,
    /// Registration retry backoff ceiling.
    pub register_backoff_ceiling: Duration,
    /// Image used when a submission's `container_env_name` is absent.
    pub default_image: String,
    /// Resolution of `Privileged::Inherit` when a task doesn't pin it.
    pub default_privileged: bool,
    /// Inspect-poll interval used by the per-task supervisor.
    pub supervisor_poll_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let hostname = std::env::var("HAKU_HOSTNAME")
            .ok()
            .or_else(|| hostname::get().ok().and_then(|h| h.into_string().ok()))
            .ok_or(ConfigError::NoHostname)?;

        let http_bind =
            std::env::var("HAKU_RUNNER_HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:7790".to_string());
        let endpoint = std::env::var("HAKU_RUNNER_ENDPOINT").unwrap_or_else(|_| {
            let port = http_bind.rsplit(':').next().unwrap_or("7790");
            format!("{hostname}:{port}")
        });
        let shared_storage_root = std::env::var("HAKU_SHARED_STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/lib/haku/shared"));
        let log_path = std::env::var("HAKU_RUNNER_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/log/haku/hakur.log"));

        Ok(Self {
            hostname,
            endpoint,
            http_bind,
            host_url: std::env::var("HAKU_HOST_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:7780".to_string()),
            shared_storage_root,
            log_path,
            heartbeat_interval: env_duration_secs("HAKU_HEARTBEAT_INTERVAL_SECS", 10),
            register_backoff_ceiling: env_duration_secs("HAKU_REGISTER_BACKOFF_CEILING_SECS", 30),
            default_image: std::env::var("HAKU_DEFAULT_IMAGE")
                .unwrap_or_else(|_| "haku-default:latest".to_string()),
            default_privileged: std::env::var("HAKU_DEFAULT_PRIVILEGED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            supervisor_poll_interval: env_duration_secs("HAKU_SUPERVISOR_POLL_SECS", 2),
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
            hostname: "test-runner".to_string(),
            endpoint: "127.0.0.1:0".to_string(),
            http_bind: "127.0.0.1:0".to_string(),
            host_url: "http://127.0.0.1:0".to_string(),
            shared_storage_root: dir.to_path_buf(),
            log_path: dir.join("hakur.log"),
            heartbeat_interval: Duration::from_secs(10),
            register_backoff_ceiling: Duration::from_secs(30),
            default_image: "haku-default:latest".to_string(),
            default_privileged: false,
            supervisor_poll_interval: Duration::from_millis(20),
        }
    }
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}
