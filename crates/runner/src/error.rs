// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner-side error kinds: failures here are never
//! surfaced to a client directly — they become a `RunAck` rejection or a
//! `/status` report.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("unknown task: {0}")]
    UnknownTask(haku_core::TaskId),
    #[error(transparent)]
    Engine(#[from] haku_resource::EngineError),
    #[error(transparent)]
    Sync(#[from] haku_resource::SyncError),
    #[error("registration rejected by host")]
    RegistrationRejected,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for RunnerError {
    fn into_response(self) -> Response {
        let status = match self {
            RunnerError::UnknownTask(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
