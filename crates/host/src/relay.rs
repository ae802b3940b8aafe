// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH Relay: a plain TCP proxy. A client connects, sends
//! `HAKU-SSH <task_id>\n`, and is spliced byte-for-byte to the runner's
//! forwarded SSH port for the matching VPS task. The relay keeps no
//! per-session state beyond the two live sockets, matching the listener
//! task's accept-and-spawn shape the daemon uses for its own socket.

use std::sync::Arc;

use haku_core::{TaskId, TaskStatus};
use haku_store::Store;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

pub struct Relay {
    store: Arc<Store>,
}

impl Relay {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Accepts connections until the listener is closed, spawning one task
    /// per connection so a slow or stuck client cannot block new sessions.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(reason) = this.handle(stream).await {
                            debug!(%peer, %reason, "ssh relay session ended");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ssh relay accept failed");
                    return;
                }
            }
        }
    }

    async fn handle(&self, mut client: TcpStream) -> Result<(), String> {
        let task_id = match read_handshake(&mut client).await {
            Ok(id) => id,
            Err(reason) => {
                write_error_line(&mut client, &reason).await;
                return Err(reason);
            }
        };

        let Some(task) = self.store.task(task_id) else {
            let reason = "missing/invalid task id".to_string();
            write_error_line(&mut client, &reason).await;
            return Err(reason);
        };
        if !matches!(task.status, TaskStatus::Running | TaskStatus::Paused) {
            let reason = "task is not a running/paused vps".to_string();
            write_error_line(&mut client, &reason).await;
            return Err(reason);
        }
        let Some(ssh_port) = task.ssh_port else {
            let reason = "no ssh port".to_string();
            write_error_line(&mut client, &reason).await;
            return Err(reason);
        };

        let Some(node) = self.store.node(&task.target_hostname) else {
            let reason = "target node no longer registered".to_string();
            write_error_line(&mut client, &reason).await;
            return Err(reason);
        };
        let dial_host = node.endpoint.split(':').next().unwrap_or(&node.endpoint);
        let dial_addr = format!("{dial_host}:{ssh_port}");

        let mut runner = match TcpStream::connect(&dial_addr).await {
            Ok(s) => s,
            Err(e) => {
                let reason = format!("failed to dial runner: {e}");
                write_error_line(&mut client, &reason).await;
                return Err(reason);
            }
        };

        debug!(task_id = %task_id, dial_addr = %dial_addr, "ssh relay session established");
        match tokio::io::copy_bidirectional(&mut client, &mut runner).await {
            Ok((to_runner, to_client)) => {
                debug!(task_id = %task_id, to_runner, to_client, "ssh relay session closed");
                Ok(())
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "ssh relay copy failed");
                Err(e.to_string())
            }
        }
    }
}

async fn read_handshake(client: &mut TcpStream) -> Result<TaskId, String> {
    const PREFIX: &str = "HAKU-SSH ";
    const MAX_LINE: usize = 64;

    let mut buf = Vec::with_capacity(MAX_LINE);
    let mut byte = [0u8; 1];
    loop {
        if buf.len() >= MAX_LINE {
            return Err("missing/invalid task id".to_string());
        }
        match client.read_exact(&mut byte).await {
            Ok(()) => {}
            Err(_) => return Err("missing/invalid task id".to_string()),
        }
        if byte[0] == b'\n' {
            break;
        }
        buf.push(byte[0]);
    }

    let line = String::from_utf8_lossy(&buf);
    let raw_id = line
        .strip_prefix(PREFIX)
        .ok_or_else(|| "missing/invalid task id".to_string())?;
    let value: u64 = raw_id
        .trim()
        .parse()
        .map_err(|_| "missing/invalid task id".to_string())?;
    Ok(TaskId(value))
}

async fn write_error_line(client: &mut TcpStream, reason: &str) {
    let line = format!("ERROR {reason}\n");
    let _ = client.write_all(line.as_bytes()).await;
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
