use std::collections::HashMap;

use haku_core::{Privileged, TaskStatus, TaskType};
use haku_proto::{SubmitRequest, TargetSpec};

use crate::prelude::*;

fn command_for(hostname: &str, env_name: &str) -> SubmitRequest {
    SubmitRequest {
        task_type: TaskType::Command,
        command: "true".to_string(),
        arguments: Vec::new(),
        env_vars: HashMap::new(),
        required_cores: 1,
        required_memory_bytes: None,
        container_env_name: Some(env_name.to_string()),
        privileged: Privileged::Inherit,
        additional_mounts: Vec::new(),
        targets: vec![TargetSpec { hostname: hostname.to_string(), numa_id: None, gpus: Vec::new() }],
    }
}

/// Two concurrent dispatches for the same environment on the same runner:
/// exactly one `load_image` call, and both tasks proceed to launch.
#[tokio::test]
async fn concurrent_tasks_share_one_load_image_call() {
    let shared_root = tempfile::tempdir().expect("shared root");
    write_env_archive(shared_root.path(), "trainer", 1_700_000_000);

    let host = TestHost::start(shared_root.path()).await;
    let runner = TestRunner::start("node-a", &host, shared_root.path()).await;

    let first = host.submit(&command_for("node-a", "trainer")).await;
    let second = host.submit(&command_for("node-a", "trainer")).await;
    assert_eq!(first.created_task_ids.len(), 1, "failed: {:?}", first.failed_targets);
    assert_eq!(second.created_task_ids.len(), 1, "failed: {:?}", second.failed_targets);
    let first_id = task_id_of(&first);
    let second_id = task_id_of(&second);

    let both_running = wait_for(WAIT_MAX_MS, || async {
        let a = host.task(first_id).await.map(|t| t.status == TaskStatus::Running).unwrap_or(false);
        let b = host.task(second_id).await.map(|t| t.status == TaskStatus::Running).unwrap_or(false);
        a && b
    })
    .await;
    assert!(both_running, "both tasks should reach running once the shared environment is synced");

    assert_eq!(
        runner.engine.loaded_images().len(),
        1,
        "a cache hit should skip the second load_image call: {:?}",
        runner.engine.loaded_images()
    );
}

/// A newer archive for the same environment name is what gets loaded;
/// the stale sibling is ignored.
#[tokio::test]
async fn newest_archive_timestamp_wins() {
    let shared_root = tempfile::tempdir().expect("shared root");
    write_env_archive(shared_root.path(), "trainer", 1_700_000_000);
    write_env_archive(shared_root.path(), "trainer", 1_800_000_000);

    let host = TestHost::start(shared_root.path()).await;
    let runner = TestRunner::start("node-a", &host, shared_root.path()).await;

    let resp = host.submit(&command_for("node-a", "trainer")).await;
    assert_eq!(resp.created_task_ids.len(), 1, "failed: {:?}", resp.failed_targets);
    let task_id = task_id_of(&resp);

    let reached_running = wait_for(WAIT_MAX_MS, || async {
        host.task(task_id).await.map(|t| t.status == TaskStatus::Running).unwrap_or(false)
    })
    .await;
    assert!(reached_running, "task never reached running");

    let loaded = runner.engine.loaded_images();
    assert_eq!(loaded.len(), 1);
    assert!(loaded[0].contains("1800000000"), "expected the newer archive to load, got {loaded:?}");
}

/// Missing archive for a named environment fails the task before launch,
/// rather than invoking the engine at all.
#[tokio::test]
async fn missing_archive_fails_the_task_before_launch() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;
    let runner = TestRunner::start("node-a", &host, shared_root.path()).await;

    let resp = host.submit(&command_for("node-a", "never-uploaded")).await;
    assert_eq!(resp.created_task_ids.len(), 1, "failed: {:?}", resp.failed_targets);
    let task_id = task_id_of(&resp);

    let failed = wait_for(WAIT_MAX_MS, || async {
        host.task(task_id).await.map(|t| t.status == TaskStatus::Failed).unwrap_or(false)
    })
    .await;
    assert!(failed, "task should fail when its environment archive can't be found");

    let task = host.task(task_id).await.expect("task exists");
    assert!(task.error_message.unwrap_or_default().contains("no archive"));
    assert!(runner.engine.loaded_images().is_empty(), "engine should never be invoked without an archive");
}
