use std::collections::HashMap;

use haku_core::{Privileged, TaskStatus, TaskType};
use haku_proto::{SubmitRequest, TargetSpec, SSH_RELAY_HANDSHAKE_PREFIX};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::prelude::*;

/// End to end: a vps task gets a forwarded ssh port from the runner, and
/// a client dialing the relay with the handshake is spliced through to
/// whatever is listening on that port.
#[tokio::test]
async fn relay_splices_client_to_the_forwarded_port() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;
    let _runner = TestRunner::start("node-a", &host, shared_root.path()).await;

    let req = SubmitRequest {
        task_type: TaskType::Vps,
        command: "sshd".to_string(),
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
    assert_eq!(resp.created_task_ids.len(), 1, "failed: {:?}", resp.failed_targets);
    let task_id = task_id_of(&resp);

    let got_port = wait_for(WAIT_MAX_MS, || async { host.task(task_id).await.and_then(|t| t.ssh_port).is_some() }).await;
    assert!(got_port, "runner never reported an ssh port");
    let task = host.task(task_id).await.expect("task exists");
    assert_eq!(task.status, TaskStatus::Running);
    let ssh_port = task.ssh_port.expect("ssh port present");

    // Stand in for the real sshd the runner would have forwarded: echo
    // whatever the relay sends.
    let echo_listener = TcpListener::bind(("127.0.0.1", ssh_port)).await.expect("bind fake sshd");
    tokio::spawn(async move {
        if let Ok((mut sock, _)) = echo_listener.accept().await {
            let mut buf = [0u8; 64];
            if let Ok(n) = sock.read(&mut buf).await {
                let _ = sock.write_all(&buf[..n]).await;
            }
        }
    });

    let mut client = tokio::net::TcpStream::connect(host.relay_addr).await.expect("connect relay");
    client
        .write_all(format!("{SSH_RELAY_HANDSHAKE_PREFIX}{task_id}\n").as_bytes())
        .await
        .expect("write handshake");
    client.write_all(b"ping").await.expect("write payload");

    let mut buf = [0u8; 64];
    let n = client.read(&mut buf).await.expect("read echo");
    assert_eq!(&buf[..n], b"ping");
}

#[tokio::test]
async fn relay_rejects_an_unknown_task_id() {
    let shared_root = tempfile::tempdir().expect("shared root");
    let host = TestHost::start(shared_root.path()).await;

    let mut client = tokio::net::TcpStream::connect(host.relay_addr).await.expect("connect relay");
    client
        .write_all(format!("{SSH_RELAY_HANDSHAKE_PREFIX}999999\n").as_bytes())
        .await
        .expect("write handshake");

    let mut buf = [0u8; 128];
    let n = client.read(&mut buf).await.expect("read error line");
    let line = String::from_utf8_lossy(&buf[..n]);
    assert!(line.starts_with("ERROR"), "{line}");
}
