// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! haku-proto: JSON wire DTOs shared between `hakud`, `hakur`, and `haku`.
//! One request/response pair per HTTP route; the SSH relay
//! handshake line format lives here too since both the relay and any test
//! harness driving it need the same constant.

use std::collections::HashMap;

use haku_core::{
    BatchId, GpuDevice, GpuId, Hostname, NumaDomain, Privileged, Task, TaskId, TaskType,
};
use serde::{Deserialize, Serialize};

/// Prefix of the SSH relay handshake line: `"HAKU-SSH <task_id>\n"`.
pub const SSH_RELAY_HANDSHAKE_PREFIX: &str = "HAKU-SSH ";

// ---------------------------------------------------------------------
// POST /register (runner -> host)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub hostname: Hostname,
    pub endpoint: String,
    pub total_cores: u32,
    pub total_memory_bytes: u64,
    pub numa_topology: Vec<NumaDomain>,
    pub gpus: Vec<GpuDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub accepted: bool,
}

// ---------------------------------------------------------------------
// POST /heartbeat (runner -> host)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub hostname: Hostname,
    pub cpu_pct: f32,
    pub memory_pct: f32,
    pub numa_topology: Vec<NumaDomain>,
    pub gpus: Vec<GpuDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub acknowledged: bool,
}

// ---------------------------------------------------------------------
// POST /status (runner -> host)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    Running,
    Completed,
    Failed,
    Killed,
    KilledOom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusIngestRequest {
    pub task_id: TaskId,
    pub status: ReportedStatus,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub ssh_port: Option<u16>,
    #[serde(default)]
    pub unit_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusIngestResponse {
    pub applied: bool,
}

// ---------------------------------------------------------------------
// POST /submit (client -> host)
// ---------------------------------------------------------------------

/// One entry of the target grammar: `hostname`,
/// `hostname:numa_id`, or `hostname::gpu,gpu,...`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub hostname: String,
    #[serde(default)]
    pub numa_id: Option<u32>,
    #[serde(default)]
    pub gpus: Vec<GpuId>,
}

impl std::fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.gpus.is_empty() {
            let gpus: Vec<String> = self.gpus.iter().map(|g| g.0.to_string()).collect();
            write!(f, "{}::{}", self.hostname, gpus.join(","))
        } else if let Some(numa_id) = self.numa_id {
            write!(f, "{}:{}", self.hostname, numa_id)
        } else {
            write!(f, "{}", self.hostname)
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid target syntax: {0}")]
pub struct TargetParseError(pub String);

/// Parses one entry of the target grammar:
///
/// ```text
/// target   := hostname
///           | hostname ':' numa_id
///           | hostname ':' ':' gpu_list
/// gpu_list := integer (',' integer)*
/// ```
///
/// The `::gpu,gpu` form is checked before the single-colon numa form so
/// `"n1::0,1"` doesn't get misread as `hostname="n1"`, `numa=""`.
pub fn parse_target(raw: &str) -> Result<TargetSpec, TargetParseError> {
    let err = || TargetParseError(raw.to_string());

    if let Some((hostname, gpu_list)) = raw.split_once("::") {
        if hostname.is_empty() || gpu_list.is_empty() {
            return Err(err());
        }
        let gpus = gpu_list
            .split(',')
            .map(|s| s.trim().parse::<u32>().map(GpuId).map_err(|_| err()))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(TargetSpec {
            hostname: hostname.to_string(),
            numa_id: None,
            gpus,
        });
    }

    if let Some((hostname, numa_str)) = raw.split_once(':') {
        if hostname.is_empty() || numa_str.is_empty() {
            return Err(err());
        }
        let numa_id = numa_str.parse::<u32>().map_err(|_| err())?;
        return Ok(TargetSpec {
            hostname: hostname.to_string(),
            numa_id: Some(numa_id),
            gpus: Vec::new(),
        });
    }

    if raw.is_empty() {
        return Err(err());
    }
    Ok(TargetSpec {
        hostname: raw.to_string(),
        numa_id: None,
        gpus: Vec::new(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub task_type: TaskType,
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    #[serde(default)]
    pub required_cores: u32,
    #[serde(default)]
    pub required_memory_bytes: Option<u64>,
    /// Wire representation of `ContainerEnv`: `null` = host default, the
    /// literal string `"NONE"` = the OS-service-unit fallback, anything
    /// else = a named environment.
    #[serde(default)]
    pub container_env_name: Option<String>,
    #[serde(default)]
    pub privileged: Privileged,
    #[serde(default)]
    pub additional_mounts: Vec<String>,
    /// Empty or absent => auto-select.
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTarget {
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub created_task_ids: Vec<TaskId>,
    pub failed_targets: Vec<FailedTarget>,
}

// ---------------------------------------------------------------------
// GET /task/{id}
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task: Task,
}

// ---------------------------------------------------------------------
// POST /task/{id}/kill|pause|resume
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleResponse {
    pub ok: bool,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------
// GET /nodes
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub hostname: Hostname,
    pub endpoint: String,
    pub liveness: haku_core::NodeLiveness,
    pub total_cores: u32,
    pub total_memory_bytes: u64,
    pub last_cpu_pct: f32,
    pub last_memory_pct: f32,
    pub gpu_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesResponse {
    pub nodes: Vec<NodeSummary>,
}

// ---------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub nodes_online: usize,
    pub nodes_offline: usize,
    pub nodes_lost: usize,
    pub tasks_pending: usize,
    pub tasks_running: usize,
    pub tasks_terminal: usize,
}

// ---------------------------------------------------------------------
// POST /run (host -> runner)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOrder {
    pub task_id: TaskId,
    pub batch_id: Option<BatchId>,
    pub task_type: TaskType,
    pub command: String,
    pub arguments: Vec<String>,
    pub env_vars: HashMap<String, String>,
    pub required_cores: u32,
    pub required_memory_bytes: Option<u64>,
    pub required_gpus: Vec<GpuId>,
    /// `None` = host default image, `Some("NONE")` = the OS-service-unit
    /// fallback, `Some(name)` = a named environment.
    pub container_env_name: Option<String>,
    /// Canonical archive timestamp resolved by the dispatcher, so the
    /// runner loads the exact same snapshot the admission check saw.
    pub container_env_timestamp: Option<u64>,
    pub privileged: Privileged,
    pub additional_mounts: Vec<String>,
    pub target_numa_id: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAck {
    pub accepted: bool,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

// ---------------------------------------------------------------------
// POST /kill|pause|resume/{id} (host -> runner)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerLifecycleResponse {
    pub ok: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
