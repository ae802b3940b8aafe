// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Target Resolver & Admission Controller.
//!
//! The only component that aggregates per-target errors into a
//! partial-success response — every other operation in
//! this crate fails atomically. Validation runs against a point-in-time
//! read of the State Store; there is no reservation step, so concurrent
//! submissions racing for the same GPU are resolved by whichever append
//! to the store wins.

use haku_core::{
    ContainerEnv, GpuId, Hostname, Node, NodeLiveness, Privileged, Task, TaskStatus, TaskType,
};
use haku_proto::{FailedTarget, SubmitRequest, TargetSpec};
use haku_store::Store;

use crate::error::AdmissionError;

/// Outcome of resolving one submission into zero or more task records.
pub struct ResolveOutcome {
    pub created: Vec<Task>,
    pub failed: Vec<FailedTarget>,
}

/// Resolves a submission against the current state of `store`, creating one
/// task record per target that passes admission.
pub fn resolve_submission(
    store: &Store,
    id_gen: &dyn haku_core::TaskIdGen,
    req: &SubmitRequest,
    now_ms: u64,
) -> Result<ResolveOutcome, AdmissionError> {
    let container_env = parse_container_env(req.container_env_name.as_deref());

    if req.task_type == TaskType::Vps {
        if req.targets.len() > 1 {
            return Err(AdmissionError::VpsRequiresSingleTarget);
        }
        if container_env.is_fallback() {
            return Err(AdmissionError::VpsForbidsFallback);
        }
    }
    if container_env.is_fallback() && !req.targets.iter().all(|t| t.gpus.is_empty()) {
        return Err(AdmissionError::FallbackForbidsGpu);
    }

    let targets: Vec<TargetSpec> = if req.targets.is_empty() {
        match auto_select(store, req)? {
            Some(t) => vec![t],
            None => return Err(AdmissionError::NoNodeFits),
        }
    } else {
        req.targets.clone()
    };

    let mut created = Vec::new();
    let mut failed = Vec::new();
    let mut batch_id = None;

    for target in &targets {
        match admit_one(store, target, req, &container_env) {
            Ok(()) => {
                let task_id = id_gen.next();
                if targets.len() > 1 && batch_id.is_none() {
                    batch_id = Some(task_id);
                }
                let task = Task {
                    task_id,
                    batch_id: if targets.len() > 1 { batch_id } else { None },
                    task_type: req.task_type,
                    command: req.command.clone(),
                    arguments: req.arguments.clone(),
                    env_vars: req.env_vars.clone(),
                    required_cores: req.required_cores,
                    required_memory_bytes: req.required_memory_bytes,
                    required_gpus: target.gpus.clone(),
                    container_env: container_env.clone(),
                    privileged: req.privileged,
                    additional_mounts: req.additional_mounts.clone(),
                    target_hostname: Hostname::new(target.hostname.clone()),
                    target_numa_id: target.numa_id,
                    status: TaskStatus::Pending,
                    submitted_at_ms: now_ms,
                    started_at_ms: None,
                    completed_at_ms: None,
                    exit_code: None,
                    error_message: None,
                    stdout_path: None,
                    stderr_path: None,
                    assigned_unit_name: None,
                    ssh_port: None,
                    assignment_suspicion_count: 0,
                    paused_at_ms: None,
                };
                store.create_task(task.clone())?;
                created.push(task);
            }
            Err(reason) => failed.push(FailedTarget {
                target: target.to_string(),
                reason,
            }),
        }
    }

    Ok(ResolveOutcome { created, failed })
}

fn parse_container_env(name: Option<&str>) -> ContainerEnv {
    match name {
        None => ContainerEnv::Default,
        Some(n) if n == "NONE" => ContainerEnv::SystemFallback,
        Some(n) => ContainerEnv::Named(n.to_string()),
    }
}

/// Auto-select mode: any online node with enough free
/// cores and memory. No GPU auto-selection.
fn auto_select(
    store: &Store,
    req: &SubmitRequest,
) -> Result<Option<TargetSpec>, AdmissionError> {
    for node in store.list_nodes() {
        if node.liveness != NodeLiveness::Online {
            continue;
        }
        if !fits(store, &node, req.required_cores, req.required_memory_bytes) {
            continue;
        }
        return Ok(Some(TargetSpec {
            hostname: node.hostname.as_str().to_string(),
            numa_id: None,
            gpus: Vec::new(),
        }));
    }
    Ok(None)
}

fn fits(store: &Store, node: &Node, required_cores: u32, required_memory: Option<u64>) -> bool {
    let reserved_cores = store.reserved_cores(&node.hostname);
    let available_cores = (node.total_cores as u64).saturating_sub(reserved_cores);
    if available_cores < required_cores as u64 {
        return false;
    }
    if let Some(req_mem) = required_memory {
        let reserved_mem = store.reserved_memory_bytes(&node.hostname);
        let available_mem = node.total_memory_bytes.saturating_sub(reserved_mem);
        if available_mem < req_mem {
            return false;
        }
    }
    true
}

/// Runs the admission checks against one target. Returns the
/// human-readable rejection reason on failure, for `FailedTarget::reason`.
fn admit_one(
    store: &Store,
    target: &TargetSpec,
    req: &SubmitRequest,
    _container_env: &ContainerEnv,
) -> Result<(), String> {
    let hostname = Hostname::new(target.hostname.clone());
    let node = store
        .node(&hostname)
        .ok_or_else(|| "unknown node".to_string())?;

    if node.liveness != NodeLiveness::Online {
        return Err("node is not online".to_string());
    }

    if let Some(numa_id) = target.numa_id {
        if node.numa(numa_id).is_none() {
            return Err(format!("unknown numa domain {numa_id}"));
        }
    }

    if !target.gpus.is_empty() {
        let busy = store.busy_gpus(&hostname, None);
        for gpu_id in &target.gpus {
            if !node.has_gpu(*gpu_id) {
                return Err(format!("unknown gpu {gpu_id}"));
            }
            if busy.contains(gpu_id) {
                return Err(format!("gpu {gpu_id} is busy"));
            }
        }
        if has_duplicate(&target.gpus) {
            return Err("duplicate gpu id in target".to_string());
        }
    }

    if !fits(store, &node, req.required_cores, req.required_memory_bytes) {
        return Err("insufficient resources".to_string());
    }

    Ok(())
}

fn has_duplicate(ids: &[GpuId]) -> bool {
    for (i, a) in ids.iter().enumerate() {
        if ids[i + 1..].contains(a) {
            return true;
        }
    }
    false
}

/// Whether `privileged` should be honored as `true`, resolving the
/// host-default inherit case.
pub fn resolve_privileged(privileged: Privileged, host_default: bool) -> bool {
    match privileged {
        Privileged::True => true,
        Privileged::False => false,
        Privileged::Inherit => host_default,
    }
}

/// Cross-reference check used by the dispatcher before launch: a VPS task
/// must not be routed through the fallback path, and a fallback task must
/// have no GPUs.
pub fn validate_task_invariants(task: &Task) -> Result<(), AdmissionError> {
    if task.task_type == TaskType::Vps && task.container_env.is_fallback() {
        return Err(AdmissionError::VpsForbidsFallback);
    }
    if task.container_env.is_fallback() && !task.required_gpus.is_empty() {
        return Err(AdmissionError::FallbackForbidsGpu);
    }
    Ok(())
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
