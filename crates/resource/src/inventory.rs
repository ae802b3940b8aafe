// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource Inventory: per-node
//! detection of total/available cores, memory, NUMA topology, and
//! enumerated GPUs with live utilization.

use std::time::Duration;

use haku_core::{GpuDevice, GpuId, GpuTelemetry, NumaDomain};
use sysinfo::System;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to read numa topology: {0}")]
    NumaUnreadable(String),
}

#[derive(Debug, Clone)]
pub struct HostTotals {
    pub total_cores: u32,
    pub total_memory_bytes: u64,
}

/// Snapshots CPU/memory totals via `sysinfo`, the runner's NUMA topology
/// via a scan of `/sys/devices/system/node/`, and GPUs by shelling out to
/// `nvidia-smi` rather than linking NVML, per the workspace's
/// `unsafe_code = "forbid"` lint.
pub trait ResourceInventory: Send + Sync {
    fn totals(&self) -> HostTotals;
    fn numa_topology(&self) -> Result<Vec<NumaDomain>, InventoryError>;
}

pub struct SysinfoInventory;

impl Default for SysinfoInventory {
    fn default() -> Self {
        Self
    }
}

impl ResourceInventory for SysinfoInventory {
    fn totals(&self) -> HostTotals {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        HostTotals {
            total_cores: sys.cpus().len() as u32,
            total_memory_bytes: sys.total_memory(),
        }
    }

    fn numa_topology(&self) -> Result<Vec<NumaDomain>, InventoryError> {
        scan_numa_topology(std::path::Path::new("/sys/devices/system/node"))
    }
}

/// Scans `/sys/devices/system/node/node<N>/cpulist` and `meminfo` for each
/// NUMA node. Behind a function (rather than baked into the trait impl) so
/// tests can point it at a fixture directory.
pub fn scan_numa_topology(node_root: &std::path::Path) -> Result<Vec<NumaDomain>, InventoryError> {
    let mut domains = Vec::new();
    if !node_root.exists() {
        return Ok(domains);
    }

    let entries = std::fs::read_dir(node_root)
        .map_err(|e| InventoryError::NumaUnreadable(e.to_string()))?;

    for entry in entries {
        let entry = entry.map_err(|e| InventoryError::NumaUnreadable(e.to_string()))?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some(numa_id_str) = name.strip_prefix("node") else {
            continue;
        };
        let Ok(numa_id) = numa_id_str.parse::<u32>() else {
            continue;
        };

        let cpulist_path = entry.path().join("cpulist");
        let cores = std::fs::read_to_string(&cpulist_path)
            .ok()
            .map(|s| parse_cpulist(s.trim()))
            .unwrap_or_default();

        let meminfo_path = entry.path().join("meminfo");
        let memory_bytes = std::fs::read_to_string(&meminfo_path)
            .ok()
            .and_then(|s| parse_node_meminfo(&s))
            .unwrap_or(0);

        domains.push(NumaDomain {
            numa_id,
            cores,
            memory_bytes,
        });
    }

    domains.sort_by_key(|d| d.numa_id);
    Ok(domains)
}

/// Parses a Linux cpulist like `"0-3,8-11"` into individual core indices.
fn parse_cpulist(list: &str) -> Vec<u32> {
    let mut cores = Vec::new();
    for part in list.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) {
                cores.extend(start..=end);
            }
        } else if let Ok(core) = part.parse::<u32>() {
            cores.push(core);
        }
    }
    cores
}

/// Parses the `Node N MemTotal:  NNNN kB` line from a node's `meminfo`.
fn parse_node_meminfo(text: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        let line = line.trim();
        let rest = line.strip_prefix("Node")?;
        let (_, rest) = rest.split_once("MemTotal:")?;
        let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
        Some(kb * 1024)
    })
}

const NVIDIA_SMI_TIMEOUT: Duration = Duration::from_secs(5);
const NVIDIA_SMI_QUERY: &str = "index,name,driver_version,memory.total,utilization.gpu,memory.used,temperature.gpu,power.draw";

/// Enumerates GPUs via `nvidia-smi --query-gpu=... --format=csv,noheader,nounits`.
/// Absence of `nvidia-smi` on `$PATH` yields an empty inventory, not an
/// error.
pub async fn detect_gpus() -> Vec<GpuDevice> {
    let mut cmd = Command::new("nvidia-smi");
    cmd.arg(format!("--query-gpu={NVIDIA_SMI_QUERY}"));
    cmd.arg("--format=csv,noheader,nounits");

    let output = match tokio::time::timeout(NVIDIA_SMI_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => output,
        _ => return Vec::new(),
    };

    let text = String::from_utf8_lossy(&output.stdout);
    text.lines().filter_map(parse_nvidia_smi_line).collect()
}

fn parse_nvidia_smi_line(line: &str) -> Option<GpuDevice> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 8 {
        return None;
    }
    Some(GpuDevice {
        gpu_id: GpuId(fields[0].parse().ok()?),
        model: fields[1].to_string(),
        driver_version: fields[2].to_string(),
        total_memory_bytes: fields[3].parse::<u64>().ok()? * 1024 * 1024,
        telemetry: GpuTelemetry {
            utilization_pct: fields[4].parse().ok()?,
            memory_used_bytes: fields[5].parse::<u64>().ok()? * 1024 * 1024,
            temperature_celsius: fields[6].parse().ok()?,
            power_watts: fields[7].parse().ok()?,
        },
    })
}

#[cfg(test)]
#[path = "inventory_tests.rs"]
mod tests;
