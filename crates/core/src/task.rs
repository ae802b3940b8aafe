// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task domain model and state machine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, GpuId, Hostname, TaskId};

/// `command` runs a program to completion; `vps` is long-lived and exposes
/// an SSH endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Command,
    Vps,
}

/// Which runtime executes a task.
///
/// Three wire states collapse to three variants: an absent
/// `container_env_name` is the runner's host-default image, the sentinel
/// `"NONE"` is the OS-service-unit fallback, anything else names an
/// environment. The sentinel never appears past the deserialization
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEnv {
    Default,
    Named(String),
    SystemFallback,
}

impl ContainerEnv {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ContainerEnv::SystemFallback)
    }
}

impl Default for ContainerEnv {
    fn default() -> Self {
        ContainerEnv::Default
    }
}

const FALLBACK_SENTINEL: &str = "NONE";

impl Serialize for ContainerEnv {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            ContainerEnv::Default => serializer.serialize_none(),
            ContainerEnv::Named(name) => serializer.serialize_str(name),
            ContainerEnv::SystemFallback => serializer.serialize_str(FALLBACK_SENTINEL),
        }
    }
}

impl<'de> Deserialize<'de> for ContainerEnv {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw {
            None => ContainerEnv::Default,
            Some(name) if name == FALLBACK_SENTINEL => ContainerEnv::SystemFallback,
            Some(name) => ContainerEnv::Named(name),
        })
    }
}

/// `true`/`false`/inherit-the-host-default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privileged {
    True,
    False,
    Inherit,
}

impl Default for Privileged {
    fn default() -> Self {
        Privileged::Inherit
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigning,
    Running,
    Paused,
    Completed,
    Failed,
    Killed,
    KilledOom,
    Lost,
}

impl TaskStatus {
    /// Statuses from which a transition *to* `self` is legal. Used by the
    /// state store's atomic transition primitive.
    pub fn allowed_predecessors(self) -> &'static [TaskStatus] {
        use TaskStatus::*;
        match self {
            Pending => &[],
            Assigning => &[Pending],
            Running => &[Assigning, Paused],
            Paused => &[Running],
            Completed => &[Running],
            Failed => &[Assigning, Running],
            Killed => &[Pending, Assigning, Running, Paused],
            KilledOom => &[Running],
            Lost => &[Assigning, Running, Paused],
        }
    }

    /// Terminal states never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Killed
                | TaskStatus::KilledOom
                | TaskStatus::Lost
        )
    }
}

/// One dispatchable unit produced from a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub batch_id: Option<BatchId>,
    pub task_type: TaskType,
    pub command: String,
    pub arguments: Vec<String>,
    pub env_vars: HashMap<String, String>,
    pub required_cores: u32,
    pub required_memory_bytes: Option<u64>,
    pub required_gpus: Vec<GpuId>,
    pub container_env: ContainerEnv,
    pub privileged: Privileged,
    pub additional_mounts: Vec<String>,
    pub target_hostname: Hostname,
    pub target_numa_id: Option<u32>,
    pub status: TaskStatus,
    pub submitted_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
    pub stdout_path: Option<String>,
    pub stderr_path: Option<String>,
    pub assigned_unit_name: Option<String>,
    pub ssh_port: Option<u16>,
    pub assignment_suspicion_count: u32,
    pub paused_at_ms: Option<u64>,
}

impl Task {
    /// Whether this task currently holds a claim on its node's GPUs, i.e.
    /// a member of `{assigning, running, paused}`. Per spec Invariant 2,
    /// `pending` tasks do not yet hold any gpu-id — gpu-lists are only
    /// checked against tasks that have passed admission.
    pub fn holds_resources(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Assigning | TaskStatus::Running | TaskStatus::Paused
        )
    }

    /// Whether this task's `required_cores`/`required_memory_bytes` must be
    /// counted against its node's capacity, i.e. a member of `{pending,
    /// assigning, running, paused}` per spec Invariant 1. `pending` is
    /// included here (unlike [`Task::holds_resources`]) because dispatch is
    /// asynchronous: a task sits in `pending` between admission and the
    /// dispatcher's `pending -> assigning` transition, and a second
    /// submission racing that window must still see its reservation.
    pub fn reserves_capacity(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Pending | TaskStatus::Assigning | TaskStatus::Running | TaskStatus::Paused
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
