// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node domain model.

use serde::{Deserialize, Serialize};

use crate::ids::{GpuId, Hostname};

/// A NUMA domain: a subset of a node's cores with locally-attached memory.
///
/// Stored as a flat, ordered record rather than a nested map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumaDomain {
    pub numa_id: u32,
    pub cores: Vec<u32>,
    pub memory_bytes: u64,
}

/// Live GPU telemetry, refreshed on every heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpuTelemetry {
    pub utilization_pct: f32,
    pub memory_used_bytes: u64,
    pub temperature_celsius: f32,
    pub power_watts: f32,
}

/// One GPU device as enumerated by the Resource Inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuDevice {
    pub gpu_id: GpuId,
    pub model: String,
    pub driver_version: String,
    pub total_memory_bytes: u64,
    pub telemetry: GpuTelemetry,
}

/// Liveness status of a node, driven by the Heartbeat Monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLiveness {
    Online,
    Offline,
    Lost,
}

/// A compute node in the cluster.
///
/// Created on first registration from a hostname; mutated by
/// re-registration, heartbeats, and the liveness sweep. Never destroyed
/// automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub hostname: Hostname,
    pub endpoint: String,
    pub total_cores: u32,
    pub total_memory_bytes: u64,
    pub numa_topology: Vec<NumaDomain>,
    pub gpus: Vec<GpuDevice>,
    pub liveness: NodeLiveness,
    pub last_heartbeat_ms: u64,
    pub last_cpu_pct: f32,
    pub last_memory_pct: f32,
}

impl Node {
    /// Constructs a freshly-registered node, online as of `now_ms`.
    pub fn register(
        hostname: Hostname,
        endpoint: String,
        total_cores: u32,
        total_memory_bytes: u64,
        numa_topology: Vec<NumaDomain>,
        gpus: Vec<GpuDevice>,
        now_ms: u64,
    ) -> Self {
        Self {
            hostname,
            endpoint,
            total_cores,
            total_memory_bytes,
            numa_topology,
            gpus,
            liveness: NodeLiveness::Online,
            last_heartbeat_ms: now_ms,
            last_cpu_pct: 0.0,
            last_memory_pct: 0.0,
        }
    }

    /// Checks the `total_cores >= sum(numa[k].cores)` invariant.
    pub fn topology_within_total_cores(&self) -> bool {
        let sum: usize = self.numa_topology.iter().map(|n| n.cores.len()).sum();
        sum as u64 <= self.total_cores as u64
    }

    pub fn numa(&self, numa_id: u32) -> Option<&NumaDomain> {
        self.numa_topology.iter().find(|n| n.numa_id == numa_id)
    }

    pub fn has_gpu(&self, gpu_id: GpuId) -> bool {
        self.gpus.iter().any(|g| g.gpu_id == gpu_id)
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
