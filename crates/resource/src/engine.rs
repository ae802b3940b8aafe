// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Container Engine Adapter.
//!
//! One trait, three implementations: a production adapter
//! ([`DockerEngine`], via `bollard`), a fallback adapter
//! ([`ServiceUnitEngine`], shelling out to `systemd-run`/`systemctl`) for
//! tasks whose `container_env` is [`haku_core::ContainerEnv::SystemFallback`],
//! and a [`FakeEngine`] recording calls for tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use haku_core::GpuId;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("image not found: {0}")]
    ImageMissing(String),
    #[error("container daemon unreachable: {0}")]
    DaemonUnreachable(String),
    #[error("invalid resource request: {0}")]
    InvalidResource(String),
    #[error("name conflict: {0}")]
    NameConflict(String),
    #[error("unit not found: {0}")]
    UnitNotFound(String),
}

/// Parameters shared by both `run_ephemeral` and `run_persistent_ssh`.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub image: String,
    pub name: String,
    pub cores: f64,
    pub memory_bytes: u64,
    pub gpus: Vec<GpuId>,
    pub mounts: Vec<String>,
    pub env: HashMap<String, String>,
    pub privileged: bool,
    pub cmd: String,
    pub args: Vec<String>,
    pub workdir: Option<String>,
}

/// Result of `inspect`: the runtime's current view of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitState {
    Running,
    Exited,
    NotFound,
}

#[derive(Debug, Clone)]
pub struct InspectResult {
    pub state: UnitState,
    pub exit_code: Option<i32>,
    pub oom_killed: bool,
}

/// Detached-process stream handle for `exec` (terminal relay).
pub struct ExecStream {
    pub stdin: Box<dyn tokio::io::AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync + 'static {
    async fn run_ephemeral(&self, spec: RunSpec) -> Result<String, EngineError>;

    /// Returns the unit id and the ephemeral host-side SSH port mapping.
    async fn run_persistent_ssh(
        &self,
        spec: RunSpec,
        ssh_pubkey: &str,
    ) -> Result<(String, u16), EngineError>;

    async fn stop(&self, unit_id: &str) -> Result<(), EngineError>;
    async fn pause(&self, unit_id: &str) -> Result<(), EngineError>;
    async fn unpause(&self, unit_id: &str) -> Result<(), EngineError>;
    async fn exec(&self, unit_id: &str, cmd: &str) -> Result<ExecStream, EngineError>;
    async fn load_image(&self, archive_path: &str) -> Result<(), EngineError>;
    async fn commit_and_save(
        &self,
        unit_id: &str,
        name: &str,
        archive_path: &str,
    ) -> Result<(), EngineError>;
    async fn inspect(&self, unit_id: &str) -> Result<InspectResult, EngineError>;
}

const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a subprocess with a timeout, killing it if the deadline passes.
pub(crate) async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<std::process::Output, EngineError> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(EngineError::DaemonUnreachable(format!(
            "{description} failed: {io_err}"
        ))),
        Err(_elapsed) => Err(EngineError::DaemonUnreachable(format!(
            "{description} timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

pub(crate) fn default_timeout() -> Duration {
    SUBPROCESS_TIMEOUT
}

mod docker;
mod service_unit;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use docker::DockerEngine;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{EngineCall, FakeEngine};
pub use service_unit::ServiceUnitEngine;

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
