// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup topology/GPU detection and host registration:
//! retries with exponential backoff until the host accepts, the same
//! retry-with-backoff shape the Dispatcher uses for run orders.

use std::time::Duration;

use haku_core::Hostname;
use haku_proto::RegisterRequest;
use haku_resource::{detect_gpus, HostTotals, InventoryError, ResourceInventory};
use tracing::{info, warn};

/// Snapshots local totals, NUMA topology, and GPUs into a `RegisterRequest`.
pub async fn build_register_request(
    hostname: &str,
    endpoint: &str,
    inventory: &dyn ResourceInventory,
) -> Result<RegisterRequest, InventoryError> {
    let HostTotals { total_cores, total_memory_bytes } = inventory.totals();
    let numa_topology = inventory.numa_topology()?;
    let gpus = detect_gpus().await;

    Ok(RegisterRequest {
        hostname: Hostname::new(hostname.to_string()),
        endpoint: endpoint.to_string(),
        total_cores,
        total_memory_bytes,
        numa_topology,
        gpus,
    })
}

/// Registers with the host, retrying with `min(2^attempt * 500ms, ceiling)`
/// backoff until accepted. Never gives up — a runner with no host to
/// report to has no useful work to do.
pub async fn register_until_accepted(
    http: &reqwest::Client,
    host_url: &str,
    request: &RegisterRequest,
    backoff_ceiling: Duration,
) {
    let url = format!("{host_url}/register");
    let mut attempt: u32 = 0;
    loop {
        match http.post(&url).json(request).send().await {
            Ok(resp) => match resp.json::<haku_proto::RegisterResponse>().await {
                Ok(body) if body.accepted => {
                    info!(hostname = %request.hostname, "registered with host");
                    return;
                }
                Ok(_) => {
                    warn!(hostname = %request.hostname, "registration not accepted, retrying");
                }
                Err(e) => {
                    warn!(error = %e, "malformed registration response, retrying");
                }
            },
            Err(e) => {
                warn!(error = %e, attempt, "registration attempt failed");
            }
        }
        tokio::time::sleep(backoff(attempt, backoff_ceiling)).await;
        attempt += 1;
    }
}

fn backoff(attempt: u32, ceiling: Duration) -> Duration {
    let base = Duration::from_millis(500).saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    base.min(ceiling)
}

#[cfg(test)]
#[path = "registration_tests.rs"]
mod tests;
