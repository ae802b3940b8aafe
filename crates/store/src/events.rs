// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event log's payload type.
//!
//! Every mutation to [`crate::state::MaterializedState`] is represented as
//! one of these variants, appended to the WAL before being applied
//! in-memory. `apply_event` handlers must be idempotent: replaying the same
//! event twice (e.g. after a crash mid-checkpoint) must not change the
//! result.

use haku_core::{GpuDevice, Hostname, NodeLiveness, NumaDomain, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    NodeRegistered {
        hostname: Hostname,
        endpoint: String,
        total_cores: u32,
        total_memory_bytes: u64,
        numa_topology: Vec<NumaDomain>,
        gpus: Vec<GpuDevice>,
        at_ms: u64,
    },
    NodeReregistered {
        hostname: Hostname,
        endpoint: String,
        total_cores: u32,
        total_memory_bytes: u64,
        numa_topology: Vec<NumaDomain>,
        gpus: Vec<GpuDevice>,
        at_ms: u64,
    },
    HeartbeatReceived {
        hostname: Hostname,
        cpu_pct: f32,
        memory_pct: f32,
        numa_topology: Vec<NumaDomain>,
        gpus: Vec<GpuDevice>,
        at_ms: u64,
    },
    NodeLivenessChanged {
        hostname: Hostname,
        liveness: NodeLiveness,
        at_ms: u64,
    },
    TaskCreated {
        task: Box<haku_core::Task>,
    },
    TaskStatusChanged {
        task_id: TaskId,
        to: TaskStatus,
        at_ms: u64,
        exit_code: Option<i32>,
        error_message: Option<String>,
        ssh_port: Option<u16>,
        assigned_unit_name: Option<String>,
    },
    TaskDispatched {
        task_id: TaskId,
        at_ms: u64,
    },
    TaskSuspicionIncremented {
        task_id: TaskId,
    },
    TaskPaths {
        task_id: TaskId,
        stdout_path: String,
        stderr_path: String,
    },
}
