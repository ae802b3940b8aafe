// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-side error kinds, grouped by the component that
//! raises them. HTTP handlers convert these to status codes at the
//! boundary rather than leaking internal detail to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Raised by the Target Resolver & Admission Controller.
/// Always returned synchronously to the submitting client.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("unknown node: {0}")]
    UnknownNode(String),
    #[error("node {0} is not online")]
    NodeNotOnline(String),
    #[error("unknown numa domain {numa_id} on node {hostname}")]
    UnknownNuma { hostname: String, numa_id: u32 },
    #[error("unknown gpu {gpu_id} on node {hostname}")]
    UnknownGpu { hostname: String, gpu_id: u32 },
    #[error("gpu {gpu_id} on node {hostname} is busy")]
    GpuBusy { hostname: String, gpu_id: u32 },
    #[error("insufficient cores on {hostname}: requested {requested}, available {available}")]
    InsufficientCores {
        hostname: String,
        requested: u32,
        available: u64,
    },
    #[error("insufficient memory on {hostname}: requested {requested}, available {available}")]
    InsufficientMemory {
        hostname: String,
        requested: u64,
        available: u64,
    },
    #[error("no online node satisfies the request")]
    NoNodeFits,
    #[error("vps submissions require exactly one target")]
    VpsRequiresSingleTarget,
    #[error("vps tasks cannot use the OS-service-unit fallback")]
    VpsForbidsFallback,
    #[error("the OS-service-unit fallback forbids gpu targeting")]
    FallbackForbidsGpu,
    #[error("invalid target syntax: {0}")]
    InvalidTargetSyntax(String),
    #[error(transparent)]
    Store(#[from] haku_store::StoreError),
}

/// Raised while dispatching a task to its runner.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("runner unreachable: {0}")]
    RunnerUnreachable(String),
    #[error("dispatch unreachable after retries")]
    Exhausted,
    #[error(transparent)]
    Store(#[from] haku_store::StoreError),
}

/// Raised by Task Coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("task not found: {0}")]
    NotFound(haku_core::TaskId),
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error(transparent)]
    Store(#[from] haku_store::StoreError),
    #[error("failed to read log: {0}")]
    LogUnreadable(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = match self {
            AdmissionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match self {
            DispatchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::RunnerUnreachable(_) | DispatchError::Exhausted => {
                StatusCode::BAD_GATEWAY
            }
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = match self {
            CoordinatorError::NotFound(_) | CoordinatorError::NodeNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            CoordinatorError::Store(_) | CoordinatorError::LogUnreadable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
