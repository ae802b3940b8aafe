// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-order handling and the per-task supervisor: select
//! the execution path, synchronize the environment archive, launch, report
//! `running`, then a spawned supervisor task waits for termination and
//! reports the terminal status with exit code and OOM detection.

use std::path::Path;
use std::sync::Arc;

use haku_core::{Privileged, TaskId, TaskType};
use haku_proto::{ReportedStatus, RunOrder, StatusIngestRequest};
use haku_resource::{ContainerEngine, RunSpec, UnitState};
use tracing::{info, warn};

use crate::ctx::RunnerCtx;

/// Handles one `/run` POST end-to-end: resolves the
/// image, syncs the environment archive, launches via the selected engine,
/// posts `running`, and spawns the terminal-status supervisor. Returns the
/// rejection reason on any pre-launch failure — the caller turns that into
/// a `RunAck { accepted: false, .. } `and a `failed` `/status` post.
pub async fn handle_run_order(ctx: Arc<RunnerCtx>, order: RunOrder) -> Result<(), String> {
    let engine = Arc::clone(ctx.engine_for(order.container_env_name.as_deref()));

    let image = resolve_image(&ctx, engine.as_ref(), &order).await?;

    let unit_name = format!("haku-task-{}-{}", order.task_id, short_uuid());
    let privileged = match order.privileged {
        Privileged::True => true,
        Privileged::False => false,
        Privileged::Inherit => ctx.config.default_privileged,
    };

    let mut mounts = order.additional_mounts.clone();
    if order.task_type == TaskType::Command {
        let root = ctx.config.shared_storage_root.to_string_lossy().to_string();
        mounts.push(format!("{root}:{root}"));
    }

    let (cmd, args) = match order.task_type {
        TaskType::Command => wrap_with_redirection(
            &order.command,
            &order.arguments,
            &ctx.config.stdout_path(order.task_id),
            &ctx.config.stderr_path(order.task_id),
        ),
        TaskType::Vps => (String::new(), Vec::new()),
    };

    let spec = RunSpec {
        image,
        name: unit_name,
        cores: order.required_cores as f64,
        memory_bytes: order.required_memory_bytes.unwrap_or(0),
        gpus: order.required_gpus.clone(),
        mounts,
        env: order.env_vars.clone(),
        privileged,
        cmd,
        args,
        workdir: None,
    };

    let (unit_id, ssh_port) = match order.task_type {
        TaskType::Vps => engine
            .run_persistent_ssh(spec, &order.command)
            .await
            .map(|(id, port)| (id, Some(port)))
            .map_err(|e| e.to_string())?,
        TaskType::Command => engine
            .run_ephemeral(spec)
            .await
            .map(|id| (id, None))
            .map_err(|e| e.to_string())?,
    };

    ctx.remember_unit(order.task_id, unit_id.clone(), order.container_env_name.clone());
    info!(task_id = %order.task_id, unit_id = %unit_id, "task launched");

    report_status(
        &ctx,
        order.task_id,
        ReportedStatus::Running,
        None,
        None,
        ssh_port,
        Some(unit_id.clone()),
    )
    .await;

    tokio::spawn(supervise(ctx, order.task_id, unit_id, engine));
    Ok(())
}

async fn resolve_image(
    ctx: &RunnerCtx,
    engine: &dyn ContainerEngine,
    order: &RunOrder,
) -> Result<String, String> {
    match order.container_env_name.as_deref() {
        None => Ok(ctx.config.default_image.clone()),
        // The fallback engine runs a bare command, not a container image.
        Some("NONE") => Ok(String::new()),
        Some(name) => {
            ctx.env_sync.sync(name, engine).await.map_err(|e| e.to_string())?;
            Ok(name.to_string())
        }
    }
}

/// Polls `inspect` until the unit leaves the running state, then reports
/// the terminal status. A `NotFound` result means the
/// unit was already torn down by an explicit kill, whose handler is the
/// one responsible for the host-side transition — the supervisor just
/// stops quietly rather than racing it with a second report.
async fn supervise(ctx: Arc<RunnerCtx>, task_id: TaskId, unit_id: String, engine: Arc<dyn ContainerEngine>) {
    loop {
        tokio::time::sleep(ctx.config.supervisor_poll_interval).await;

        let inspected = match engine.inspect(&unit_id).await {
            Ok(i) => i,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "supervisor inspect failed, giving up");
                return;
            }
        };

        match inspected.state {
            UnitState::Running => continue,
            UnitState::NotFound => {
                ctx.forget(task_id);
                return;
            }
            UnitState::Exited => {
                ctx.forget(task_id);
                let status = if inspected.oom_killed {
                    ReportedStatus::KilledOom
                } else if inspected.exit_code == Some(0) {
                    ReportedStatus::Completed
                } else {
                    ReportedStatus::Failed
                };
                let error = (status == ReportedStatus::Failed)
                    .then(|| format!("process exited with code {:?}", inspected.exit_code));
                report_status(&ctx, task_id, status, inspected.exit_code, error, None, None).await;
                return;
            }
        }
    }
}

pub(crate) async fn report_status(
    ctx: &RunnerCtx,
    task_id: TaskId,
    status: ReportedStatus,
    exit_code: Option<i32>,
    error: Option<String>,
    ssh_port: Option<u16>,
    unit_id: Option<String>,
) {
    let body = StatusIngestRequest { task_id, status, exit_code, error, ssh_port, unit_id };
    let url = format!("{}/status", ctx.config.host_url);
    if let Err(e) = ctx.host_client.post(&url).json(&body).send().await {
        warn!(task_id = %task_id, error = %e, "status report failed");
    }
}

/// Wraps a command/args pair in a shell invocation redirecting stdout/stderr
/// to the deterministic shared-storage paths recorded on the task at
/// dispatch time. The shared-storage root is bind-mounted
/// into the container at the identical host path, so the same path works
/// whether the command runs in a container or (for the fallback engine)
/// directly on the host.
fn wrap_with_redirection(
    command: &str,
    args: &[String],
    stdout_path: &Path,
    stderr_path: &Path,
) -> (String, Vec<String>) {
    let mut line = shell_quote(command);
    for arg in args {
        line.push(' ');
        line.push_str(&shell_quote(arg));
    }
    line.push_str(&format!(
        " > {} 2> {}",
        shell_quote(&stdout_path.to_string_lossy()),
        shell_quote(&stderr_path.to_string_lossy()),
    ));
    ("sh".to_string(), vec!["-c".to_string(), line])
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn short_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
