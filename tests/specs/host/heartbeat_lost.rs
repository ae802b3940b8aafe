use std::collections::HashMap;
use std::time::Duration;

use haku_core::{NodeLiveness, Privileged, TaskStatus, TaskType};
use haku_proto::{SubmitRequest, TargetSpec};

use crate::prelude::*;

/// A node that stops heartbeating past the sweep timeout is marked
/// offline, and any task it was running is failed to `lost` rather than
/// left running forever.
#[tokio::test]
async fn unresponsive_node_loses_its_running_task() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;
    let _runner = TestRunner::start("node-a", &host, shared_root.path()).await;

    let req = SubmitRequest {
        task_type: TaskType::Command,
        command: "true".to_string(),
        arguments: Vec::new(),
        env_vars: HashMap::new(),
        required_cores: 1,
        required_memory_bytes: None,
        container_env_name: None,
        privileged: Privileged::Inherit,
        additional_mounts: Vec::new(),
        targets: vec![TargetSpec { hostname: "node-a".to_string(), numa_id: None, gpus: Vec::new() }],
    };

    let resp = host.submit(&req).await;
    let task_id = task_id_of(&resp);

    let running = wait_for(WAIT_MAX_MS, || async {
        host.task(task_id).await.map(|t| t.status == TaskStatus::Running).unwrap_or(false)
    })
    .await;
    assert!(running, "task never started running");

    // The node registered at t=0 and never heartbeats again; a short
    // timeout puts it well past due without a real sleep measured in
    // the sweep interval's own units.
    tokio::time::sleep(Duration::from_millis(5)).await;
    host.sweep_heartbeats(Duration::from_millis(1));

    let node = host.store.node(&haku_core::Hostname::new("node-a")).expect("node exists");
    assert_eq!(node.liveness, NodeLiveness::Offline);

    let task = host.task(task_id).await.expect("task exists");
    assert_eq!(task.status, TaskStatus::Lost);
    assert!(task.error_message.as_deref().unwrap_or("").contains("offline"));
}

#[tokio::test]
async fn a_node_still_within_the_timeout_stays_online() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;
    let _runner = TestRunner::start("node-a", &host, shared_root.path()).await;

    host.sweep_heartbeats(Duration::from_secs(3600));

    let node = host.store.node(&haku_core::Hostname::new("node-a")).expect("node exists");
    assert_eq!(node.liveness, NodeLiveness::Online);
}
