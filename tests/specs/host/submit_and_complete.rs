use std::collections::HashMap;
use std::time::Duration;

use haku_core::{Privileged, TaskStatus, TaskType};
use haku_proto::{SubmitRequest, TargetSpec};

use crate::prelude::*;

#[tokio::test]
async fn command_task_runs_and_completes() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;
    let runner = TestRunner::start("node-a", &host, shared_root.path()).await;

    let req = SubmitRequest {
        task_type: TaskType::Command,
        command: "echo".to_string(),
        arguments: vec!["hi".to_string()],
        env_vars: HashMap::new(),
        required_cores: 1,
        required_memory_bytes: None,
        container_env_name: None,
        privileged: Privileged::Inherit,
        additional_mounts: Vec::new(),
        targets: vec![TargetSpec { hostname: "node-a".to_string(), numa_id: None, gpus: Vec::new() }],
    };

    let resp = host.submit(&req).await;
    assert_eq!(resp.created_task_ids.len(), 1, "failed targets: {:?}", resp.failed_targets);
    assert!(resp.failed_targets.is_empty());
    let task_id = task_id_of(&resp);

    // FakeEngine never runs anything itself, so the task only reaches
    // `running` once the runner's dispatch handler has recorded the unit.
    let reached_running = wait_for(WAIT_MAX_MS, || async {
        host.task(task_id).await.map(|t| t.status == TaskStatus::Running).unwrap_or(false)
    })
    .await;
    assert!(reached_running, "task never reached running");

    let task = host.task(task_id).await.expect("task exists");
    assert_eq!(task.target_hostname.as_str(), "node-a");
    let stdout_path = task.stdout_path.clone().expect("stdout path recorded for command task");
    std::fs::write(&stdout_path, b"hi\n").expect("write fake stdout");

    runner
        .engine
        .set_exit(task.assigned_unit_name.as_deref().expect("unit recorded"), 0, false);

    let completed = wait_for(WAIT_MAX_MS, || async {
        host.task(task_id).await.map(|t| t.status == TaskStatus::Completed).unwrap_or(false)
    })
    .await;
    assert!(completed, "task never completed");

    let task = host.task(task_id).await.expect("task exists");
    assert_eq!(task.exit_code, Some(0));
    assert_eq!(host.stdout_of(task_id).await, "hi\n");
}

#[tokio::test]
async fn submit_to_unknown_node_is_rejected_without_retry() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;

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
        targets: vec![TargetSpec { hostname: "ghost".to_string(), numa_id: None, gpus: Vec::new() }],
    };

    let resp = host.submit(&req).await;
    assert!(resp.created_task_ids.is_empty());
    assert_eq!(resp.failed_targets.len(), 1);
    assert_eq!(resp.failed_targets[0].target, "ghost");
    assert!(resp.failed_targets[0].reason.contains("unknown node"));

    // Nothing should linger past an instant: no dispatch was spawned.
    tokio::time::sleep(Duration::from_millis(20)).await;
}
