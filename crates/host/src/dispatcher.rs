// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Dispatcher: transmits per-instance run orders to
//! runners, retries a bounded number of times on network error, and
//! surfaces terminal dispatch failures. Never blocks the submitting
//! client — `Coordinator::submit` returns task ids immediately and spawns
//! one dispatch task per created instance.

use std::sync::Arc;
use std::time::Duration;

use haku_core::{Clock, Task, TaskId, TaskStatus};
use haku_proto::{RunAck, RunOrder};
use haku_store::Store;
use rand::Rng;
use tracing::{info, warn};

use crate::config::Config;

/// Everything the dispatcher needs, shared across every spawned attempt.
pub struct Dispatcher {
    pub store: Arc<Store>,
    pub http: reqwest::Client,
    pub clock: Arc<dyn Clock>,
    pub max_retries: u32,
    pub backoff_ceiling: Duration,
    pub env_archives_dir: std::path::PathBuf,
    pub task_outputs_dir: std::path::PathBuf,
    pub task_errors_dir: std::path::PathBuf,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, http: reqwest::Client, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            store,
            http,
            clock,
            max_retries: config.dispatch_max_retries,
            backoff_ceiling: config.dispatch_backoff_ceiling,
            env_archives_dir: config.env_archives_dir(),
            task_outputs_dir: config.task_outputs_dir(),
            task_errors_dir: config.task_errors_dir(),
        }
    }

    /// Dispatch `task_id`, transitioning it `pending -> assigning` first.
    /// Spawned as a background task by the caller so submission never
    /// blocks on network I/O.
    pub async fn dispatch(self: Arc<Self>, task_id: TaskId) {
        let now = self.clock.now_ms();
        let transitioned = self
            .store
            .transition_task(task_id, &[TaskStatus::Pending], TaskStatus::Assigning, now, |_| {});
        match transitioned {
            Ok(true) => {}
            Ok(false) => {
                warn!(task_id = %task_id, "dispatch skipped: task left pending before assignment");
                return;
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "store error transitioning to assigning");
                return;
            }
        }

        let Some(mut task) = self.store.task(task_id) else {
            return;
        };
        if let Err(e) = self.store.mark_dispatched(task_id, now) {
            warn!(task_id = %task_id, error = %e, "store error recording dispatch");
        }

        // Command-task output paths are fixed by task id alone, so they are
        // recorded here rather than waited for from the runner — the host
        // can serve `/task/{id}/stdout|stderr` without asking the runner.
        if task.task_type == haku_core::TaskType::Command {
            let stdout_path = self.task_outputs_dir.join(format!("{task_id}.out"));
            let stderr_path = self.task_errors_dir.join(format!("{task_id}.err"));
            if let Err(e) = self.store.set_task_paths(
                task_id,
                stdout_path.to_string_lossy().into_owned(),
                stderr_path.to_string_lossy().into_owned(),
            ) {
                warn!(task_id = %task_id, error = %e, "store error recording task output paths");
            }
            task.stdout_path = Some(stdout_path.to_string_lossy().into_owned());
            task.stderr_path = Some(stderr_path.to_string_lossy().into_owned());
        }

        self.attempt(task).await;
    }

    async fn attempt(&self, task: Task) {
        let Some(node) = self.store.node(&task.target_hostname) else {
            self.fail(task.task_id, "target node no longer registered");
            return;
        };

        let order = self.build_run_order(&task);

        for attempt in 0..=self.max_retries {
            let url = format!("http://{}/run", node.endpoint);
            match self.http.post(&url).json(&order).send().await {
                Ok(resp) => match resp.json::<RunAck>().await {
                    Ok(RunAck { accepted: true, .. }) => {
                        info!(task_id = %task.task_id, hostname = %task.target_hostname, "run order accepted");
                        return;
                    }
                    Ok(RunAck { accepted: false, rejection_reason }) => {
                        let reason = rejection_reason.unwrap_or_else(|| "rejected by runner".to_string());
                        self.fail(task.task_id, &reason);
                        return;
                    }
                    Err(e) => {
                        warn!(task_id = %task.task_id, error = %e, "malformed run-order response");
                        self.fail(task.task_id, "malformed run-order response");
                        return;
                    }
                },
                Err(e) => {
                    warn!(
                        task_id = %task.task_id,
                        hostname = %task.target_hostname,
                        attempt,
                        error = %e,
                        "dispatch attempt failed"
                    );
                    if let Err(store_err) = self.store.increment_suspicion(task.task_id) {
                        warn!(task_id = %task.task_id, error = %store_err, "failed to record suspicion");
                    }
                    if attempt == self.max_retries {
                        self.fail(task.task_id, "dispatch unreachable");
                        return;
                    }
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
            }
        }
    }

    /// `min(2^attempt * 200ms, ceiling)` with +-20% jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = Duration::from_millis(200).saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = base.min(self.backoff_ceiling);
        let jitter_frac = rand::thread_rng().gen_range(0.8..1.2);
        capped.mul_f64(jitter_frac)
    }

    fn fail(&self, task_id: TaskId, reason: &str) {
        let now = self.clock.now_ms();
        let result = self.store.transition_task(
            task_id,
            &[TaskStatus::Assigning],
            TaskStatus::Failed,
            now,
            |fields| {
                fields.error(reason);
            },
        );
        if let Err(e) = result {
            warn!(task_id = %task_id, error = %e, "store error failing task");
        }
    }

    fn build_run_order(&self, task: &Task) -> RunOrder {
        let container_env_name = match &task.container_env {
            haku_core::ContainerEnv::Default => None,
            haku_core::ContainerEnv::SystemFallback => Some("NONE".to_string()),
            haku_core::ContainerEnv::Named(name) => Some(name.clone()),
        };
        let container_env_timestamp = match &task.container_env {
            haku_core::ContainerEnv::Named(name) => {
                haku_resource::envsync::scan_latest(&self.env_archives_dir, name)
                    .ok()
                    .flatten()
                    .map(|(ts, _)| ts)
            }
            haku_core::ContainerEnv::Default | haku_core::ContainerEnv::SystemFallback => None,
        };

        RunOrder {
            task_id: task.task_id,
            batch_id: task.batch_id,
            task_type: task.task_type,
            command: task.command.clone(),
            arguments: task.arguments.clone(),
            env_vars: task.env_vars.clone(),
            required_cores: task.required_cores,
            required_memory_bytes: task.required_memory_bytes,
            required_gpus: task.required_gpus.clone(),
            container_env_name,
            container_env_timestamp,
            privileged: task.privileged,
            additional_mounts: task.additional_mounts.clone(),
            target_numa_id: task.target_numa_id,
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
