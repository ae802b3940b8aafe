//! Shared harness for the behavioral specs: an in-process host
//! coordinator and one or more in-process runner agents, wired to real
//! `tokio::net::TcpListener`s so every scenario drives the actual HTTP
//! routes and the actual SSH relay rather than calling handlers directly.
//!
//! Runners use [`FakeEngine`] in place of Docker/systemd so these tests
//! run without either installed. The host side needs no such
//! substitution: the State Store, Dispatcher, Coordinator, and Relay
//! have no external dependency.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use haku_core::{Clock, GpuDevice, Hostname, SystemClock, TaskId};
use haku_host::config::Config as HostConfig;
use haku_host::coordinator::Coordinator;
use haku_host::ctx::HostCtx;
use haku_host::dispatcher::Dispatcher;
use haku_host::{heartbeat, http as host_http, relay};
use haku_proto::{RegisterRequest, RegisterResponse, SubmitRequest, SubmitResponse, TaskResponse};
use haku_resource::FakeEngine;
use haku_runner::config::Config as RunnerConfig;
use haku_runner::ctx::RunnerCtx;
use haku_runner::http as runner_http;
use haku_store::Store;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const POLL_INTERVAL_MS: u64 = 10;
pub const WAIT_MAX_MS: u64 = 2000;

/// Poll `check` until it resolves to `true` or `timeout_ms` elapses.
pub async fn wait_for<F, Fut>(timeout_ms: u64, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }
}

async fn bind_loopback() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local_addr");
    (listener, addr)
}

/// An in-process `hakud`, minus the process lifecycle (lock file,
/// signal handling) a real binary adds around the same pieces.
pub struct TestHost {
    pub addr: SocketAddr,
    pub relay_addr: SocketAddr,
    pub store: Arc<Store>,
    http_task: JoinHandle<()>,
    relay_task: JoinHandle<()>,
}

impl TestHost {
    pub async fn start(shared_root: &Path) -> Self {
        let state_dir = tempfile::tempdir().expect("state tempdir");
        std::fs::create_dir_all(shared_root.join("envs")).unwrap();
        std::fs::create_dir_all(shared_root.join("task_outputs")).unwrap();
        std::fs::create_dir_all(shared_root.join("task_errors")).unwrap();

        let config = HostConfig {
            state_dir: state_dir.path().to_path_buf(),
            lock_path: state_dir.path().join("hakud.pid"),
            log_path: state_dir.path().join("hakud.log"),
            wal_path: state_dir.path().join("wal").join("events.wal"),
            snapshot_path: state_dir.path().join("snapshot.json"),
            shared_storage_root: shared_root.to_path_buf(),
            http_bind: "127.0.0.1:0".to_string(),
            relay_bind: "127.0.0.1:0".to_string(),
            heartbeat_sweep_interval: Duration::from_secs(3600),
            heartbeat_timeout: Duration::from_secs(3600),
            dispatch_max_retries: 2,
            dispatch_backoff_ceiling: Duration::from_millis(50),
        };

        let store = Arc::new(Store::open_in_memory(state_dir.path()).expect("open store"));
        let ctx = HostCtx::new(Arc::clone(&store), config.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            ctx.http.clone(),
            Arc::new(SystemClock),
            &config,
        ));
        let coordinator =
            Arc::new(Coordinator::new(Arc::clone(&store), Arc::clone(&dispatcher), ctx.http.clone(), config.clone()));

        let (http_listener, addr) = bind_loopback().await;
        let app = host_http::router(Arc::clone(&ctx), Arc::clone(&coordinator));
        let http_task = tokio::spawn(async move {
            let _ = axum::serve(http_listener, app.into_make_service()).await;
        });

        let (relay_listener, relay_addr) = bind_loopback().await;
        let relay_actor = Arc::new(relay::Relay::new(Arc::clone(&store)));
        let relay_task = tokio::spawn(relay_actor.run(relay_listener));

        // Keep the tempdir alive for the process lifetime of the test
        // binary rather than the function: leaking it here is simpler
        // than threading its ownership through every caller, and the
        // directory is removed with the rest of the test's tmp files.
        std::mem::forget(state_dir);

        Self { addr, relay_addr, store, http_task, relay_task }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn register_node(&self, hostname: &str, endpoint: &str, cores: u32, memory_bytes: u64, gpus: Vec<GpuDevice>) {
        self.store
            .create_or_update_node(
                Hostname::new(hostname),
                endpoint.to_string(),
                cores,
                memory_bytes,
                Vec::new(),
                gpus,
                SystemClock.now_ms(),
            )
            .expect("register node");
    }

    pub async fn register_node_http(&self, req: &RegisterRequest) -> RegisterResponse {
        reqwest::Client::new()
            .post(format!("{}/register", self.base_url()))
            .json(req)
            .send()
            .await
            .expect("register request")
            .json()
            .await
            .expect("register response")
    }

    pub async fn submit(&self, req: &SubmitRequest) -> SubmitResponse {
        reqwest::Client::new()
            .post(format!("{}/submit", self.base_url()))
            .json(req)
            .send()
            .await
            .expect("submit request")
            .json()
            .await
            .expect("submit response")
    }

    pub async fn task(&self, id: TaskId) -> Option<haku_core::Task> {
        let resp = reqwest::Client::new().get(format!("{}/task/{id}", self.base_url())).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<TaskResponse>().await.ok().map(|r| r.task)
    }

    pub async fn stdout_of(&self, id: TaskId) -> String {
        reqwest::Client::new()
            .get(format!("{}/task/{id}/stdout", self.base_url()))
            .send()
            .await
            .expect("stdout request")
            .text()
            .await
            .expect("stdout body")
    }

    pub fn sweep_heartbeats(&self, timeout: Duration) {
        heartbeat::sweep_once(&self.store, &SystemClock, timeout);
    }
}

impl Drop for TestHost {
    fn drop(&mut self) {
        self.http_task.abort();
        self.relay_task.abort();
    }
}

/// An in-process `hakur`, backed by [`FakeEngine`] instead of Docker.
pub struct TestRunner {
    pub addr: SocketAddr,
    pub engine: Arc<FakeEngine>,
    http_task: JoinHandle<()>,
}

impl TestRunner {
    pub async fn start(hostname: &str, host: &TestHost, shared_root: &Path) -> Self {
        let (listener, addr) = bind_loopback().await;
        let engine = Arc::new(FakeEngine::new());

        let config = RunnerConfig {
            hostname: hostname.to_string(),
            endpoint: addr.to_string(),
            http_bind: addr.to_string(),
            host_url: host.base_url(),
            shared_storage_root: shared_root.to_path_buf(),
            log_path: shared_root.join(format!("{hostname}.log")),
            heartbeat_interval: Duration::from_secs(3600),
            register_backoff_ceiling: Duration::from_millis(50),
            default_image: "haku-test-default:latest".to_string(),
            default_privileged: false,
            supervisor_poll_interval: Duration::from_millis(20),
        };

        let ctx = RunnerCtx::new(engine.clone(), engine.clone(), config);
        let app = runner_http::router(Arc::clone(&ctx));
        let http_task = tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service()).await;
        });

        host.register_node(hostname, &addr.to_string(), 8, 16 * 1024 * 1024 * 1024, Vec::new());

        Self { addr, engine, http_task }
    }

    /// Registers with GPUs present, for admission scenarios that target
    /// one. Replaces whatever the node previously registered.
    pub fn register_with_gpus(&self, host: &TestHost, hostname: &str, cores: u32, memory_bytes: u64, gpus: Vec<GpuDevice>) {
        host.register_node(hostname, &self.addr.to_string(), cores, memory_bytes, gpus);
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        self.http_task.abort();
    }
}

pub fn task_id_of(resp: &SubmitResponse) -> TaskId {
    *resp.created_task_ids.first().expect("at least one created task")
}

/// Writes a dummy environment archive `<shared_root>/envs/<name>.<ts>.tar`
/// so `scan_latest` has something to find.
pub fn write_env_archive(shared_root: &Path, name: &str, ts: u64) {
    let dir = shared_root.join("envs");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{name}.{ts}.tar")), b"not a real archive").unwrap();
}

// =============================================================================
// CLI
// =============================================================================

/// Fluent wrapper over `assert_cmd::Command` for the `haku` operator CLI,
/// pointed at a [`TestHost`] via `--host`.
pub struct CliBuilder {
    cmd: assert_cmd::Command,
}

pub fn haku(host: &TestHost) -> CliBuilder {
    let mut cmd = assert_cmd::Command::cargo_bin("haku").expect("haku binary built");
    cmd.arg("--host").arg(host.base_url());
    CliBuilder { cmd }
}

impl CliBuilder {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn passes(mut self) -> RunAssert {
        let output = self.cmd.output().expect("command should run");
        assert!(
            output.status.success(),
            "expected command to pass, got exit code {:?}\nstdout: {}\nstderr: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
        RunAssert { output }
    }

    pub fn fails(mut self) -> RunAssert {
        let output = self.cmd.output().expect("command should run");
        assert!(
            !output.status.success(),
            "expected command to fail, but it passed\nstdout: {}",
            String::from_utf8_lossy(&output.stdout),
        );
        RunAssert { output }
    }
}

pub struct RunAssert {
    output: std::process::Output,
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        assert!(self.stdout().contains(expected), "stdout does not contain '{expected}'\nstdout: {}", self.stdout());
        self
    }
}
