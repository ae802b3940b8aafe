// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use haku_core::{ContainerEnv, Hostname, Privileged, Task, TaskId, TaskStatus, TaskType};
use haku_store::Store;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::*;

fn vps_task(id: u64, hostname: &str, status: TaskStatus, ssh_port: Option<u16>) -> Task {
    Task {
        task_id: TaskId(id),
        batch_id: None,
        task_type: TaskType::Vps,
        command: "ssh-pubkey".into(),
        arguments: vec![],
        env_vars: HashMap::new(),
        required_cores: 1,
        required_memory_bytes: None,
        required_gpus: vec![],
        container_env: ContainerEnv::SystemFallback,
        privileged: Privileged::Inherit,
        additional_mounts: vec![],
        target_hostname: Hostname::new(hostname),
        target_numa_id: None,
        status,
        submitted_at_ms: 0,
        started_at_ms: None,
        completed_at_ms: None,
        exit_code: None,
        error_message: None,
        stdout_path: None,
        stderr_path: None,
        assigned_unit_name: None,
        ssh_port,
        assignment_suspicion_count: 0,
        paused_at_ms: None,
    }
}

#[tokio::test]
async fn relays_bytes_bidirectionally_to_the_runner_port() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(Store::open_in_memory(dir.path()).expect("open store"));

    let runner_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind runner");
    let runner_port = runner_listener.local_addr().expect("addr").port();

    store
        .create_or_update_node(
            Hostname::new("n1"),
            format!("127.0.0.1:{runner_port}"),
            4,
            8 << 30,
            vec![],
            vec![],
            1,
        )
        .expect("register");
    store
        .create_task(vps_task(1, "n1", TaskStatus::Running, Some(runner_port)))
        .expect("create task");

    let relay_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
    let relay_addr = relay_listener.local_addr().expect("addr");
    let relay = Arc::new(Relay::new(Arc::clone(&store)));
    tokio::spawn(relay.run(relay_listener));

    let runner_side = tokio::spawn(async move {
        let (mut sock, _) = runner_listener.accept().await.expect("accept");
        let mut from_client = vec![0u8; 4096];
        sock.read_exact(&mut from_client).await.expect("read from client");
        sock.write_all(b"reply-from-runner").await.expect("write to client");
        from_client
    });

    let mut client = TcpStream::connect(relay_addr).await.expect("connect to relay");
    client.write_all(b"HAKU-SSH 1\n").await.expect("handshake");
    let payload = vec![0x42u8; 4096];
    client.write_all(&payload).await.expect("write payload");
    client.shutdown().await.ok();

    let mut from_runner = Vec::new();
    client.read_to_end(&mut from_runner).await.expect("read reply");
    assert_eq!(from_runner, b"reply-from-runner");

    let observed = runner_side.await.expect("runner task");
    assert_eq!(observed, payload);
}

#[tokio::test]
async fn unknown_task_id_gets_an_error_line() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(Store::open_in_memory(dir.path()).expect("open store"));

    let relay_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
    let relay_addr = relay_listener.local_addr().expect("addr");
    let relay = Arc::new(Relay::new(Arc::clone(&store)));
    tokio::spawn(relay.run(relay_listener));

    let mut client = TcpStream::connect(relay_addr).await.expect("connect");
    client.write_all(b"HAKU-SSH 999\n").await.expect("handshake");

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.expect("read error line");
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("ERROR"));
    assert!(text.contains("missing/invalid task id"));
}

#[tokio::test]
async fn task_without_ssh_port_gets_an_error_line() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(Store::open_in_memory(dir.path()).expect("open store"));
    store
        .create_or_update_node(Hostname::new("n1"), "n1:9000".into(), 4, 8 << 30, vec![], vec![], 1)
        .expect("register");
    store
        .create_task(vps_task(2, "n1", TaskStatus::Assigning, None))
        .expect("create task");

    let relay_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
    let relay_addr = relay_listener.local_addr().expect("addr");
    let relay = Arc::new(Relay::new(Arc::clone(&store)));
    tokio::spawn(relay.run(relay_listener));

    let mut client = TcpStream::connect(relay_addr).await.expect("connect");
    client.write_all(b"HAKU-SSH 2\n").await.expect("handshake");

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.expect("read error line");
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("ERROR"));
}
