// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use haku_core::NumaDomain;
use haku_resource::{HostTotals, InventoryError, ResourceInventory};

use super::*;

struct FakeInventory;

impl ResourceInventory for FakeInventory {
    fn totals(&self) -> HostTotals {
        HostTotals { total_cores: 4, total_memory_bytes: 8 << 30 }
    }

    fn numa_topology(&self) -> Result<Vec<NumaDomain>, InventoryError> {
        Ok(vec![NumaDomain { numa_id: 0, cores: vec![0, 1, 2, 3], memory_bytes: 8 << 30 }])
    }
}

#[tokio::test]
async fn build_heartbeat_carries_hostname_and_topology() {
    let body = build_heartbeat("n1", &FakeInventory).await;
    assert_eq!(body.hostname, haku_core::Hostname::new("n1"));
    assert_eq!(body.numa_topology.len(), 1);
    assert!(body.memory_pct >= 0.0);
}
