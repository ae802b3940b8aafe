// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat Monitor: a periodic sweep that marks silent
//! runners offline and fails their active tasks. `T` must exceed `3 * H`
//! to tolerate transient jitter; that relationship is
//! documented, not enforced in code, since `H` lives on the runner.

use std::sync::Arc;
use std::time::Duration;

use haku_core::{Clock, NodeLiveness, TaskStatus};
use haku_store::Store;
use tracing::{info, warn};

/// Runs the liveness sweep every `interval`, transitioning nodes whose
/// `last_heartbeat` is older than `timeout` from `online` to `offline`
/// and failing every non-terminal task they owned.
pub async fn run_sweep_loop(
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    timeout: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        sweep_once(&store, clock.as_ref(), timeout);
    }
}

/// One sweep pass, factored out so tests can drive it deterministically
/// without waiting on a real timer.
pub fn sweep_once(store: &Store, clock: &dyn Clock, timeout: Duration) {
    let now = clock.now_ms();
    let timeout_ms = timeout.as_millis() as u64;

    for node in store.list_nodes() {
        if node.liveness != NodeLiveness::Online {
            continue;
        }
        if now.saturating_sub(node.last_heartbeat_ms) <= timeout_ms {
            continue;
        }

        if let Err(e) = store.set_node_liveness(node.hostname.clone(), NodeLiveness::Offline, now) {
            warn!(hostname = %node.hostname, error = %e, "failed to mark node offline");
            continue;
        }
        info!(hostname = %node.hostname, "node marked offline after missed heartbeats");

        let owned = store.tasks_by_hostname(&node.hostname);
        for task in owned {
            if task.is_terminal() {
                continue;
            }
            let allowed = [TaskStatus::Assigning, TaskStatus::Running, TaskStatus::Paused];
            let result = store.transition_task(task.task_id, &allowed, TaskStatus::Lost, now, |fields| {
                fields.error(format!("node {} offline", node.hostname));
            });
            match result {
                Ok(true) => info!(task_id = %task.task_id, hostname = %node.hostname, "task lost: node offline"),
                Ok(false) => {}
                Err(e) => warn!(task_id = %task.task_id, error = %e, "failed to mark task lost"),
            }
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
