// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use super::*;

fn spec(name: &str) -> RunSpec {
    RunSpec {
        image: "alpine:latest".into(),
        name: name.into(),
        cores: 1.0,
        memory_bytes: 512 * 1024 * 1024,
        gpus: vec![],
        mounts: vec![],
        env: HashMap::new(),
        privileged: false,
        cmd: "echo".into(),
        args: vec!["hi".into()],
        workdir: None,
    }
}

#[tokio::test]
async fn fake_engine_records_run_ephemeral() {
    let engine = FakeEngine::new();
    let unit = engine.run_ephemeral(spec("task-1")).await.expect("run");
    assert_eq!(unit, "task-1");

    let inspected = engine.inspect(&unit).await.expect("inspect");
    assert_eq!(inspected.state, UnitState::Running);
}

#[tokio::test]
async fn fake_engine_name_conflict_is_fatal() {
    let engine = FakeEngine::new();
    engine.fail_name_conflict("dup");
    let err = engine.run_ephemeral(spec("dup")).await.unwrap_err();
    assert!(matches!(err, EngineError::NameConflict(_)));
}

#[tokio::test]
async fn fake_engine_ssh_ports_are_distinct() {
    let engine = FakeEngine::new();
    let (_, port_a) = engine
        .run_persistent_ssh(spec("vps-a"), "ssh-rsa AAAA")
        .await
        .expect("run a");
    let (_, port_b) = engine
        .run_persistent_ssh(spec("vps-b"), "ssh-rsa AAAA")
        .await
        .expect("run b");
    assert_ne!(port_a, port_b);
}

#[tokio::test]
async fn inspect_reports_exit_code_and_oom() {
    let engine = FakeEngine::new();
    let unit = engine.run_ephemeral(spec("task-2")).await.expect("run");
    engine.set_exit(&unit, 137, true);

    let inspected = engine.inspect(&unit).await.expect("inspect");
    assert_eq!(inspected.state, UnitState::Exited);
    assert_eq!(inspected.exit_code, Some(137));
    assert!(inspected.oom_killed);
}

#[tokio::test]
async fn stop_removes_unit_from_inventory() {
    let engine = FakeEngine::new();
    let unit = engine.run_ephemeral(spec("task-3")).await.expect("run");
    engine.stop(&unit).await.expect("stop");
    let inspected = engine.inspect(&unit).await.expect("inspect");
    assert_eq!(inspected.state, UnitState::NotFound);
}
