// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP control surface exposed to clients and runners.
//! Every handler is a thin adapter over [`crate::coordinator::Coordinator`]
//! plus the handful of routes ([`register`], [`heartbeat`], [`nodes`],
//! [`health`]) that talk to the store and resource snapshots directly.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use haku_core::{NodeLiveness, TaskId};
use haku_proto::{
    HealthResponse, HeartbeatRequest, HeartbeatResponse, LifecycleResponse, NodeSummary,
    NodesResponse, RegisterRequest, RegisterResponse, StatusIngestRequest, StatusIngestResponse,
    SubmitRequest, SubmitResponse, TaskResponse,
};
use haku_store::Store;
use tower_http::trace::TraceLayer;

use crate::coordinator::{Coordinator, LogStream};
use crate::ctx::HostCtx;
use crate::error::CoordinatorError;

pub fn router(ctx: Arc<HostCtx>, coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/heartbeat", post(heartbeat))
        .route("/submit", post(submit))
        .route("/task/:id", get(get_task))
        .route("/task/:id/kill", post(kill_task))
        .route("/task/:id/pause", post(pause_task))
        .route("/task/:id/resume", post(resume_task))
        .route("/task/:id/stdout", get(stdout))
        .route("/task/:id/stderr", get(stderr))
        .route("/status", post(status_ingest))
        .route("/nodes", get(nodes))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { ctx, coordinator })
}

#[derive(Clone)]
struct AppState {
    ctx: Arc<HostCtx>,
    coordinator: Arc<Coordinator>,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Json<RegisterResponse> {
    let now = state.ctx.now_ms();
    let result = state.ctx.store.create_or_update_node(
        req.hostname,
        req.endpoint,
        req.total_cores,
        req.total_memory_bytes,
        req.numa_topology,
        req.gpus,
        now,
    );
    Json(RegisterResponse { accepted: result.is_ok() })
}

async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> Json<HeartbeatResponse> {
    let now = state.ctx.now_ms();
    let hostname = req.hostname;
    let known = state.ctx.store.node(&hostname).is_some();
    if known {
        let _ = state.ctx.store.record_heartbeat(
            hostname.clone(),
            req.cpu_pct,
            req.memory_pct,
            req.numa_topology,
            req.gpus,
            now,
        );
        let _ = state.ctx.store.set_node_liveness(hostname, NodeLiveness::Online, now);
    }
    Json(HeartbeatResponse { acknowledged: known })
}

async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, crate::error::AdmissionError> {
    let now = state.ctx.now_ms();
    let resp = state.coordinator.submit(state.ctx.id_gen.as_ref(), &req, now)?;
    Ok(Json(resp))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<TaskResponse>, CoordinatorError> {
    let task = state.coordinator.status(TaskId(id))?;
    Ok(Json(TaskResponse { task }))
}

async fn kill_task(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<LifecycleResponse>, CoordinatorError> {
    let now = state.ctx.now_ms();
    state.coordinator.kill(TaskId(id), now).await?;
    Ok(Json(LifecycleResponse { ok: true, message: None }))
}

async fn pause_task(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<LifecycleResponse>, CoordinatorError> {
    let now = state.ctx.now_ms();
    state.coordinator.pause(TaskId(id), now).await?;
    Ok(Json(LifecycleResponse { ok: true, message: None }))
}

async fn resume_task(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<LifecycleResponse>, CoordinatorError> {
    let now = state.ctx.now_ms();
    state.coordinator.resume(TaskId(id), now).await?;
    Ok(Json(LifecycleResponse { ok: true, message: None }))
}

async fn stdout(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, CoordinatorError> {
    let bytes = state.coordinator.fetch_log(TaskId(id), LogStream::Stdout).await?;
    Ok(([(axum::http::header::CONTENT_TYPE, "text/plain")], bytes))
}

async fn stderr(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, CoordinatorError> {
    let bytes = state.coordinator.fetch_log(TaskId(id), LogStream::Stderr).await?;
    Ok(([(axum::http::header::CONTENT_TYPE, "text/plain")], bytes))
}

async fn status_ingest(
    State(state): State<AppState>,
    Json(req): Json<StatusIngestRequest>,
) -> Result<Json<StatusIngestResponse>, CoordinatorError> {
    let now = state.ctx.now_ms();
    let applied = state.coordinator.ingest_status(
        req.task_id,
        req.status,
        req.exit_code,
        req.error,
        req.ssh_port,
        req.unit_id,
        now,
    )?;
    Ok(Json(StatusIngestResponse { applied }))
}

async fn nodes(State(state): State<AppState>) -> Json<NodesResponse> {
    let nodes = state
        .ctx
        .store
        .list_nodes()
        .into_iter()
        .map(|n| NodeSummary {
            hostname: n.hostname,
            endpoint: n.endpoint,
            liveness: n.liveness,
            total_cores: n.total_cores,
            total_memory_bytes: n.total_memory_bytes,
            last_cpu_pct: n.last_cpu_pct,
            last_memory_pct: n.last_memory_pct,
            gpu_count: n.gpus.len(),
        })
        .collect();
    Json(NodesResponse { nodes })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(aggregate_health(&state.ctx.store))
}

fn aggregate_health(store: &Store) -> HealthResponse {
    use haku_core::TaskStatus::*;

    let nodes = store.list_nodes();
    let nodes_online = nodes.iter().filter(|n| n.liveness == NodeLiveness::Online).count();
    let nodes_offline = nodes.iter().filter(|n| n.liveness == NodeLiveness::Offline).count();
    let nodes_lost = nodes.iter().filter(|n| n.liveness == NodeLiveness::Lost).count();

    let tasks_pending = store.tasks_by_status(&[Pending, Assigning]).len();
    let tasks_running = store.tasks_by_status(&[Running, Paused]).len();
    let tasks_terminal = store.tasks_by_status(&[Completed, Failed, Killed, KilledOom, Lost]).len();

    HealthResponse {
        nodes_online,
        nodes_offline,
        nodes_lost,
        tasks_pending,
        tasks_running,
        tasks_terminal,
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
