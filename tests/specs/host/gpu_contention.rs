use std::collections::HashMap;

use haku_core::{GpuDevice, GpuId, GpuTelemetry, Privileged, TaskStatus, TaskType};
use haku_proto::{SubmitRequest, TargetSpec};

use crate::prelude::*;

fn gpu(id: u32) -> GpuDevice {
    GpuDevice {
        gpu_id: GpuId(id),
        model: "Test GPU".to_string(),
        driver_version: "000.00".to_string(),
        total_memory_bytes: 16 * 1024 * 1024 * 1024,
        telemetry: GpuTelemetry {
            utilization_pct: 0.0,
            memory_used_bytes: 0,
            temperature_celsius: 30.0,
            power_watts: 20.0,
        },
    }
}

fn gpu_submission(hostname: &str, gpu_id: u32) -> SubmitRequest {
    SubmitRequest {
        task_type: TaskType::Command,
        command: "true".to_string(),
        arguments: Vec::new(),
        env_vars: HashMap::new(),
        required_cores: 1,
        required_memory_bytes: None,
        container_env_name: None,
        privileged: Privileged::Inherit,
        additional_mounts: Vec::new(),
        targets: vec![TargetSpec {
            hostname: hostname.to_string(),
            numa_id: None,
            gpus: vec![GpuId(gpu_id)],
        }],
    }
}

#[tokio::test]
async fn second_submission_to_a_busy_gpu_is_rejected() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;
    let runner = TestRunner::start("node-a", &host, shared_root.path()).await;
    runner.register_with_gpus(&host, "node-a", 8, 16 * 1024 * 1024 * 1024, vec![gpu(0)]);

    let first = host.submit(&gpu_submission("node-a", 0)).await;
    assert_eq!(first.created_task_ids.len(), 1);
    let first_id = task_id_of(&first);

    // A GPU only counts as busy once the task actually holds resources
    // (assigning/running/paused), so wait past admission before probing
    // the second submission.
    let holding = wait_for(WAIT_MAX_MS, || async {
        host.task(first_id)
            .await
            .map(|t| matches!(t.status, TaskStatus::Assigning | TaskStatus::Running))
            .unwrap_or(false)
    })
    .await;
    assert!(holding, "first task never started holding resources");

    let second = host.submit(&gpu_submission("node-a", 0)).await;
    assert!(second.created_task_ids.is_empty());
    assert_eq!(second.failed_targets.len(), 1);
    assert!(second.failed_targets[0].reason.contains("busy"), "{}", second.failed_targets[0].reason);
}

#[tokio::test]
async fn distinct_gpus_on_the_same_node_admit_concurrently() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;
    let runner = TestRunner::start("node-a", &host, shared_root.path()).await;
    runner.register_with_gpus(&host, "node-a", 8, 16 * 1024 * 1024 * 1024, vec![gpu(0), gpu(1)]);

    let first = host.submit(&gpu_submission("node-a", 0)).await;
    assert_eq!(first.created_task_ids.len(), 1);

    let second = host.submit(&gpu_submission("node-a", 1)).await;
    assert_eq!(second.created_task_ids.len(), 1, "failed: {:?}", second.failed_targets);
}

#[tokio::test]
async fn duplicate_gpu_id_in_one_target_is_rejected() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;
    let runner = TestRunner::start("node-a", &host, shared_root.path()).await;
    runner.register_with_gpus(&host, "node-a", 8, 16 * 1024 * 1024 * 1024, vec![gpu(0)]);

    let mut req = gpu_submission("node-a", 0);
    req.targets[0].gpus.push(GpuId(0));

    let resp = host.submit(&req).await;
    assert!(resp.created_task_ids.is_empty());
    assert_eq!(resp.failed_targets.len(), 1);
    assert!(resp.failed_targets[0].reason.contains("duplicate"), "{}", resp.failed_targets[0].reason);
}
