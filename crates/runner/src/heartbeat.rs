// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat emission: every `H` seconds, post live
//! CPU/memory percentages, full NUMA topology, and GPU telemetry to the
//! host so the Heartbeat Monitor's sweep sees this node as live.

use std::time::Duration;

use haku_core::Hostname;
use haku_proto::HeartbeatRequest;
use haku_resource::{detect_gpus, ResourceInventory};
use sysinfo::System;
use tracing::warn;

/// Snapshots current CPU%/memory% plus topology/GPUs into a heartbeat body.
pub async fn build_heartbeat(
    hostname: &str,
    inventory: &dyn ResourceInventory,
) -> HeartbeatRequest {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    // `sysinfo` needs two samples spaced apart to report non-zero CPU
    // usage; `MINIMUM_CPU_UPDATE_INTERVAL` is the shortest gap it honors.
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let cpu_pct = sys.global_cpu_usage();
    let memory_pct = if sys.total_memory() > 0 {
        (sys.used_memory() as f32 / sys.total_memory() as f32) * 100.0
    } else {
        0.0
    };

    let numa_topology = inventory.numa_topology().unwrap_or_default();
    let gpus = detect_gpus().await;

    HeartbeatRequest {
        hostname: Hostname::new(hostname.to_string()),
        cpu_pct,
        memory_pct,
        numa_topology,
        gpus,
    }
}

/// Runs forever, posting a heartbeat every `interval`.
pub async fn run_heartbeat_loop(
    http: reqwest::Client,
    host_url: String,
    hostname: String,
    inventory: std::sync::Arc<dyn ResourceInventory>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let body = build_heartbeat(&hostname, inventory.as_ref()).await;
        let url = format!("{host_url}/heartbeat");
        match http.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                warn!(status = %resp.status(), "heartbeat rejected by host");
            }
            Err(e) => {
                warn!(error = %e, "heartbeat post failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
