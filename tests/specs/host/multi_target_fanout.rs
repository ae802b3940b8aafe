use std::collections::HashMap;

use haku_core::{Privileged, TaskType};
use haku_proto::{SubmitRequest, TargetSpec};

use crate::prelude::*;

/// A submission naming more than one target stamps every created task
/// with a shared `batch_id`, even when only one target is actually
/// admitted.
#[tokio::test]
async fn partial_admission_still_batches() {
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
        targets: vec![
            TargetSpec { hostname: "node-a".to_string(), numa_id: None, gpus: Vec::new() },
            TargetSpec { hostname: "ghost".to_string(), numa_id: None, gpus: Vec::new() },
        ],
    };

    let resp = host.submit(&req).await;
    assert_eq!(resp.created_task_ids.len(), 1);
    assert_eq!(resp.failed_targets.len(), 1);
    assert_eq!(resp.failed_targets[0].target, "ghost");

    let task = host.task(task_id_of(&resp)).await.expect("created task");
    assert!(task.batch_id.is_some(), "a multi-target submission must batch even a lone survivor");
}

#[tokio::test]
async fn fully_admitted_fanout_shares_one_batch_id() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;
    let _a = TestRunner::start("node-a", &host, shared_root.path()).await;
    let _b = TestRunner::start("node-b", &host, shared_root.path()).await;

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
        targets: vec![
            TargetSpec { hostname: "node-a".to_string(), numa_id: None, gpus: Vec::new() },
            TargetSpec { hostname: "node-b".to_string(), numa_id: None, gpus: Vec::new() },
        ],
    };

    let resp = host.submit(&req).await;
    assert_eq!(resp.created_task_ids.len(), 2);
    assert!(resp.failed_targets.is_empty());

    let mut batch_ids = Vec::new();
    for id in &resp.created_task_ids {
        let task = host.task(*id).await.expect("created task");
        batch_ids.push(task.batch_id.expect("batched task"));
    }
    assert_eq!(batch_ids[0], batch_ids[1]);
}
