// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP control surface exposed to the host: `/run` accepts
//! a dispatch order, `/kill|pause|resume/{id}` are lifecycle commands.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use haku_core::TaskId;
use haku_proto::{RunAck, RunOrder, RunnerLifecycleResponse};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::ctx::RunnerCtx;
use crate::exec;

pub fn router(ctx: Arc<RunnerCtx>) -> Router {
    Router::new()
        .route("/run", post(run))
        .route("/kill/:id", post(kill))
        .route("/pause/:id", post(pause))
        .route("/resume/:id", post(resume))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn run(State(ctx): State<Arc<RunnerCtx>>, Json(order): Json<RunOrder>) -> Json<RunAck> {
    match exec::handle_run_order(ctx, order).await {
        Ok(()) => Json(RunAck { accepted: true, rejection_reason: None }),
        Err(reason) => {
            warn!(reason = %reason, "run order rejected");
            Json(RunAck { accepted: false, rejection_reason: Some(reason) })
        }
    }
}

async fn kill(
    State(ctx): State<Arc<RunnerCtx>>,
    Path(id): Path<u64>,
) -> Json<RunnerLifecycleResponse> {
    let task_id = TaskId(id);
    let Some(handle) = ctx.unit_for(task_id) else {
        return Json(RunnerLifecycleResponse { ok: false, message: Some("unknown task".into()) });
    };
    let engine = ctx.engine_for(handle.container_env_name.as_deref());
    let result = engine.stop(&handle.unit_id).await;
    ctx.forget(task_id);
    match result {
        Ok(()) => Json(RunnerLifecycleResponse { ok: true, message: None }),
        Err(e) => Json(RunnerLifecycleResponse { ok: false, message: Some(e.to_string()) }),
    }
}

async fn pause(
    State(ctx): State<Arc<RunnerCtx>>,
    Path(id): Path<u64>,
) -> Json<RunnerLifecycleResponse> {
    let task_id = TaskId(id);
    let Some(handle) = ctx.unit_for(task_id) else {
        return Json(RunnerLifecycleResponse { ok: false, message: Some("unknown task".into()) });
    };
    let engine = ctx.engine_for(handle.container_env_name.as_deref());
    match engine.pause(&handle.unit_id).await {
        Ok(()) => Json(RunnerLifecycleResponse { ok: true, message: None }),
        Err(e) => Json(RunnerLifecycleResponse { ok: false, message: Some(e.to_string()) }),
    }
}

async fn resume(
    State(ctx): State<Arc<RunnerCtx>>,
    Path(id): Path<u64>,
) -> Json<RunnerLifecycleResponse> {
    let task_id = TaskId(id);
    let Some(handle) = ctx.unit_for(task_id) else {
        return Json(RunnerLifecycleResponse { ok: false, message: Some("unknown task".into()) });
    };
    let engine = ctx.engine_for(handle.container_env_name.as_deref());
    match engine.unpause(&handle.unit_id).await {
        Ok(()) => Json(RunnerLifecycleResponse { ok: true, message: None }),
        Err(e) => Json(RunnerLifecycleResponse { ok: false, message: Some(e.to_string()) }),
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
