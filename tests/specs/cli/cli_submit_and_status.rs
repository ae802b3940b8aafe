use haku_core::TaskStatus;

use crate::prelude::*;

#[tokio::test]
async fn submit_then_status_round_trips_over_the_cli() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;
    let runner = TestRunner::start("node-a", &host, shared_root.path()).await;

    let submitted = haku(&host)
        .args(&["submit", "command", "echo", "hi", "--target", "node-a", "--cores", "1"])
        .passes();
    let task_id_str = submitted.stdout().trim().to_string();
    assert!(!task_id_str.is_empty(), "submit should print the new task id");
    let task_id: haku_core::TaskId = task_id_str.parse().expect("task id parses");

    let reached_running = wait_for(WAIT_MAX_MS, || async {
        host.task(task_id).await.map(|t| t.status == TaskStatus::Running).unwrap_or(false)
    })
    .await;
    assert!(reached_running, "task never reached running");

    haku(&host).args(&["status", &task_id_str]).passes().stdout_has("running");

    let task = host.task(task_id).await.expect("task exists");
    runner
        .engine
        .set_exit(task.assigned_unit_name.as_deref().expect("unit recorded"), 0, false);

    let completed = wait_for(WAIT_MAX_MS, || async {
        host.task(task_id).await.map(|t| t.status == TaskStatus::Completed).unwrap_or(false)
    })
    .await;
    assert!(completed, "task never completed");

    haku(&host).args(&["status", &task_id_str]).passes().stdout_has("completed");
}

#[tokio::test]
async fn submit_to_unknown_target_fails_and_prints_no_tasks_created() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;

    haku(&host)
        .args(&["submit", "command", "true", "--target", "ghost", "--cores", "1"])
        .fails();
}

#[tokio::test]
async fn kill_on_a_terminal_task_is_a_no_op_success() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;
    let runner = TestRunner::start("node-a", &host, shared_root.path()).await;

    let submitted = haku(&host)
        .args(&["submit", "command", "true", "--target", "node-a", "--cores", "1"])
        .passes();
    let task_id_str = submitted.stdout().trim().to_string();
    let task_id: haku_core::TaskId = task_id_str.parse().expect("task id parses");

    let reached_running = wait_for(WAIT_MAX_MS, || async {
        host.task(task_id).await.map(|t| t.status == TaskStatus::Running).unwrap_or(false)
    })
    .await;
    assert!(reached_running, "task never reached running");

    let task = host.task(task_id).await.expect("task exists");
    runner
        .engine
        .set_exit(task.assigned_unit_name.as_deref().expect("unit recorded"), 0, false);
    let completed = wait_for(WAIT_MAX_MS, || async {
        host.task(task_id).await.map(|t| t.status == TaskStatus::Completed).unwrap_or(false)
    })
    .await;
    assert!(completed, "task never completed");

    // Kill after completion: terminal tasks are a no-op success, not an error.
    haku(&host).args(&["kill", &task_id_str]).passes();

    let task = host.task(task_id).await.expect("task exists");
    assert_eq!(task.status, TaskStatus::Completed, "killing a terminal task must not change its state");
}

#[tokio::test]
async fn nodes_and_health_render_without_error() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;
    let _runner = TestRunner::start("node-a", &host, shared_root.path()).await;

    haku(&host).args(&["nodes"]).passes().stdout_has("node-a");
    haku(&host).args(&["health"]).passes().stdout_has("nodes:");
}
