// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ServiceUnitEngine`: the OS-service-unit fallback path,
//! selected per-task when `container_env == ContainerEnv::SystemFallback`.
//! Launches the command as a scoped, transient `systemd-run` unit with
//! `CPUQuota=`/`MemoryMax=` properties; pause/resume map to SIGSTOP/SIGCONT
//! via `systemctl kill`, kill maps to `systemctl stop`. VPS tasks and
//! GPU-bound tasks cannot use this path (enforced by the caller — this
//! adapter has no SSH or GPU support at all).

use async_trait::async_trait;
use tokio::process::Command;

use super::{
    default_timeout, run_with_timeout, ContainerEngine, EngineError, ExecStream, InspectResult,
    RunSpec, UnitState,
};

pub struct ServiceUnitEngine;

impl ServiceUnitEngine {
    pub fn new() -> Self {
        Self
    }

    fn unit_name(name: &str) -> String {
        format!("haku-task-{name}.service")
    }

    /// Reads the unit's cgroup `memory.events` and returns its `oom_kill`
    /// counter, or 0 if the cgroup path can't be resolved or the file is
    /// unreadable (cgroup v1 hosts, or the unit already being garbage
    /// collected). Never fails `inspect` over this — it's a cross-check on
    /// top of `Result=oom-kill`, not the primary signal.
    async fn cgroup_oom_kill_count(unit_id: &str) -> u64 {
        let mut cmd = Command::new("systemctl");
        cmd.arg("show").arg(unit_id).arg("--property=ControlGroup");
        let output = match run_with_timeout(cmd, default_timeout(), "systemctl show ControlGroup").await {
            Ok(o) => o,
            Err(_) => return 0,
        };
        let text = String::from_utf8_lossy(&output.stdout);
        let cgroup_path = text
            .lines()
            .find_map(|l| l.strip_prefix("ControlGroup="))
            .unwrap_or("");
        if cgroup_path.is_empty() {
            return 0;
        }

        let events_path = format!("/sys/fs/cgroup{cgroup_path}/memory.events");
        let contents = match tokio::fs::read_to_string(&events_path).await {
            Ok(c) => c,
            Err(_) => return 0,
        };
        contents
            .lines()
            .find_map(|l| l.strip_prefix("oom_kill "))
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0)
    }
}

impl Default for ServiceUnitEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerEngine for ServiceUnitEngine {
    async fn run_ephemeral(&self, spec: RunSpec) -> Result<String, EngineError> {
        let unit = Self::unit_name(&spec.name);

        let mut cmd = Command::new("systemd-run");
        cmd.arg("--unit").arg(&spec.name);
        cmd.arg(format!("--property=CPUQuota={}%", (spec.cores * 100.0).round() as i64));
        if spec.memory_bytes > 0 {
            cmd.arg(format!("--property=MemoryMax={}", spec.memory_bytes));
        }
        for (k, v) in &spec.env {
            cmd.arg(format!("--setenv={k}={v}"));
        }
        if let Some(workdir) = &spec.workdir {
            cmd.arg(format!("--working-directory={workdir}"));
        }
        cmd.arg(&spec.cmd).args(&spec.args);

        let output = run_with_timeout(cmd, default_timeout(), "systemd-run").await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("already exists") {
                return Err(EngineError::NameConflict(spec.name.clone()));
            }
            return Err(EngineError::InvalidResource(stderr.trim().to_string()));
        }

        Ok(unit)
    }

    async fn run_persistent_ssh(
        &self,
        _spec: RunSpec,
        _ssh_pubkey: &str,
    ) -> Result<(String, u16), EngineError> {
        Err(EngineError::InvalidResource(
            "the OS-service-unit fallback does not support vps tasks".into(),
        ))
    }

    async fn stop(&self, unit_id: &str) -> Result<(), EngineError> {
        let mut cmd = Command::new("systemctl");
        cmd.arg("stop").arg(unit_id);
        let output = run_with_timeout(cmd, default_timeout(), "systemctl stop").await?;
        if !output.status.success() {
            return Err(EngineError::UnitNotFound(unit_id.to_string()));
        }
        Ok(())
    }

    async fn pause(&self, unit_id: &str) -> Result<(), EngineError> {
        let mut cmd = Command::new("systemctl");
        cmd.arg("kill").arg("--signal=SIGSTOP").arg(unit_id);
        run_with_timeout(cmd, default_timeout(), "systemctl kill SIGSTOP").await?;
        Ok(())
    }

    async fn unpause(&self, unit_id: &str) -> Result<(), EngineError> {
        let mut cmd = Command::new("systemctl");
        cmd.arg("kill").arg("--signal=SIGCONT").arg(unit_id);
        run_with_timeout(cmd, default_timeout(), "systemctl kill SIGCONT").await?;
        Ok(())
    }

    async fn exec(&self, _unit_id: &str, _cmd: &str) -> Result<ExecStream, EngineError> {
        Err(EngineError::InvalidResource(
            "exec is not supported on the service-unit fallback".into(),
        ))
    }

    async fn load_image(&self, _archive_path: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn commit_and_save(
        &self,
        _unit_id: &str,
        _name: &str,
        _archive_path: &str,
    ) -> Result<(), EngineError> {
        Err(EngineError::InvalidResource(
            "commit/save is not supported on the service-unit fallback".into(),
        ))
    }

    async fn inspect(&self, unit_id: &str) -> Result<InspectResult, EngineError> {
        let mut cmd = Command::new("systemctl");
        cmd.arg("show")
            .arg(unit_id)
            .arg("--property=ActiveState,ExecMainStatus,Result");
        let output = run_with_timeout(cmd, default_timeout(), "systemctl show").await?;
        let text = String::from_utf8_lossy(&output.stdout);

        let mut active_state = None;
        let mut exit_code = None;
        let mut result = None;
        for line in text.lines() {
            if let Some(v) = line.strip_prefix("ActiveState=") {
                active_state = Some(v.to_string());
            }
            if let Some(v) = line.strip_prefix("ExecMainStatus=") {
                exit_code = v.parse::<i32>().ok();
            }
            if let Some(v) = line.strip_prefix("Result=") {
                result = Some(v.to_string());
            }
        }

        let state = match active_state.as_deref() {
            Some("active") | Some("activating") => UnitState::Running,
            Some("inactive") | Some("failed") | Some("deactivating") => UnitState::Exited,
            _ => UnitState::NotFound,
        };

        // systemd sets Result=oom-kill when the unit's cgroup was torn down by
        // the kernel OOM killer, independent of ExecMainStatus. Cross-check
        // the cgroup's own oom_kill counter in case the unit runs without
        // `MemoryAccounting` and systemd never observes the kill itself.
        let oom_killed =
            result.as_deref() == Some("oom-kill") || Self::cgroup_oom_kill_count(unit_id).await > 0;

        Ok(InspectResult {
            state,
            exit_code,
            oom_killed,
        })
    }
}
