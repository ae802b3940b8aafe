// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay.
//!
//! [`MaterializedState`] is the in-memory projection of every event applied
//! so far: the node table and the task table. `apply_event` is the single
//! dispatcher every event passes through, on both the live write path and
//! WAL replay during recovery. Every handler is idempotent — replaying a
//! terminal status update twice must leave the record unchanged.

use std::collections::HashMap;

use haku_core::{Hostname, Node, NodeLiveness, Task, TaskId, TaskStatus, TaskType};
use serde::{Deserialize, Serialize};

use crate::events::Event;

/// The complete materialized projection of nodes and tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializedState {
    pub nodes: HashMap<Hostname, Node>,
    pub tasks: HashMap<TaskId, Task>,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event to the state. Idempotent for every variant.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::NodeRegistered {
                hostname,
                endpoint,
                total_cores,
                total_memory_bytes,
                numa_topology,
                gpus,
                at_ms,
            }
            | Event::NodeReregistered {
                hostname,
                endpoint,
                total_cores,
                total_memory_bytes,
                numa_topology,
                gpus,
                at_ms,
            } => {
                match self.nodes.get_mut(hostname) {
                    Some(node) => {
                        node.endpoint = endpoint.clone();
                        node.total_cores = *total_cores;
                        node.total_memory_bytes = *total_memory_bytes;
                        node.numa_topology = numa_topology.clone();
                        node.gpus = gpus.clone();
                        node.liveness = NodeLiveness::Online;
                        node.last_heartbeat_ms = *at_ms;
                    }
                    None => {
                        self.nodes.insert(
                            hostname.clone(),
                            Node::register(
                                hostname.clone(),
                                endpoint.clone(),
                                *total_cores,
                                *total_memory_bytes,
                                numa_topology.clone(),
                                gpus.clone(),
                                *at_ms,
                            ),
                        );
                    }
                }
            }
            Event::HeartbeatReceived {
                hostname,
                cpu_pct,
                memory_pct,
                numa_topology,
                gpus,
                at_ms,
            } => {
                if let Some(node) = self.nodes.get_mut(hostname) {
                    node.last_heartbeat_ms = *at_ms;
                    node.last_cpu_pct = *cpu_pct;
                    node.last_memory_pct = *memory_pct;
                    node.numa_topology = numa_topology.clone();
                    node.gpus = gpus.clone();
                    node.liveness = NodeLiveness::Online;
                }
            }
            Event::NodeLivenessChanged {
                hostname,
                liveness,
                at_ms: _,
            } => {
                if let Some(node) = self.nodes.get_mut(hostname) {
                    node.liveness = *liveness;
                }
            }
            Event::TaskCreated { task } => {
                self.tasks.entry(task.task_id).or_insert_with(|| (**task).clone());
            }
            Event::TaskStatusChanged {
                task_id,
                to,
                at_ms,
                exit_code,
                error_message,
                ssh_port,
                assigned_unit_name,
            } => {
                if let Some(task) = self.tasks.get_mut(task_id) {
                    // Idempotent: a replayed terminal update that matches the
                    // current (already terminal) status is a no-op.
                    if task.status == *to && task.status.is_terminal() {
                        return;
                    }
                    task.status = *to;
                    match to {
                        TaskStatus::Running => {
                            if task.started_at_ms.is_none() {
                                task.started_at_ms = Some(*at_ms);
                            }
                            if task.task_type == TaskType::Vps {
                                task.ssh_port = ssh_port.or(task.ssh_port);
                            }
                        }
                        TaskStatus::Paused => task.paused_at_ms = Some(*at_ms),
                        _ if to.is_terminal() => {
                            task.completed_at_ms = Some(*at_ms);
                        }
                        _ => {}
                    }
                    if exit_code.is_some() {
                        task.exit_code = *exit_code;
                    }
                    if error_message.is_some() {
                        task.error_message = error_message.clone();
                    }
                    if assigned_unit_name.is_some() {
                        task.assigned_unit_name = assigned_unit_name.clone();
                    }
                }
            }
            Event::TaskDispatched { task_id, at_ms: _ } => {
                if let Some(task) = self.tasks.get_mut(task_id) {
                    if task.status == TaskStatus::Pending {
                        task.status = TaskStatus::Assigning;
                    }
                }
            }
            Event::TaskSuspicionIncremented { task_id } => {
                if let Some(task) = self.tasks.get_mut(task_id) {
                    task.assignment_suspicion_count += 1;
                }
            }
            Event::TaskPaths {
                task_id,
                stdout_path,
                stderr_path,
            } => {
                if let Some(task) = self.tasks.get_mut(task_id) {
                    task.stdout_path = Some(stdout_path.clone());
                    task.stderr_path = Some(stderr_path.clone());
                }
            }
        }
    }

    pub fn node(&self, hostname: &Hostname) -> Option<&Node> {
        self.nodes.get(hostname)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Tasks whose status is a member of `statuses`, in no particular order.
    pub fn tasks_by_status(&self, statuses: &[TaskStatus]) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|t| statuses.contains(&t.status))
            .collect()
    }

    /// Tasks currently targeted at `hostname`.
    pub fn tasks_by_hostname(&self, hostname: &Hostname) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|t| &t.target_hostname == hostname)
            .collect()
    }

    /// Non-terminal VPS tasks, across all nodes.
    pub fn active_vps_tasks(&self) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|t| t.task_type == TaskType::Vps && !t.is_terminal())
            .collect()
    }

    /// GPUs on `hostname` currently held by a task in `{assigning, running,
    /// paused}` other than `excluding`.
    pub fn busy_gpus(&self, hostname: &Hostname, excluding: Option<TaskId>) -> Vec<haku_core::GpuId> {
        self.tasks
            .values()
            .filter(|t| t.target_hostname == *hostname && t.holds_resources())
            .filter(|t| Some(t.task_id) != excluding)
            .flat_map(|t| t.required_gpus.iter().copied())
            .collect()
    }

    /// Cores currently reserved on `hostname` by tasks in `{pending,
    /// assigning, running, paused}` (spec Invariant 1). `pending` is
    /// included, unlike [`State::busy_gpus`]'s `{assigning, running,
    /// paused}`, so two submissions racing the same node while the first
    /// is still waiting to be dispatched can't both pass admission.
    pub fn reserved_cores(&self, hostname: &Hostname) -> u64 {
        self.tasks
            .values()
            .filter(|t| t.target_hostname == *hostname && t.reserves_capacity())
            .map(|t| t.required_cores as u64)
            .sum()
    }

    /// Memory currently reserved on `hostname` by tasks in `{pending,
    /// assigning, running, paused}` (spec Invariant 1); see
    /// [`State::reserved_cores`].
    pub fn reserved_memory_bytes(&self, hostname: &Hostname) -> u64 {
        self.tasks
            .values()
            .filter(|t| t.target_hostname == *hostname && t.reserves_capacity())
            .filter_map(|t| t.required_memory_bytes)
            .sum()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
