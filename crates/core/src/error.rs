// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error kinds used across crates for classification at HTTP
//! boundaries.

use thiserror::Error;

/// Coarse error kind, named rather than typed. Downstream crates
/// wrap their own `thiserror` enums but classify failures into one of
/// these for the purpose of choosing an HTTP status code / client message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Store,
    RunnerUnreachable,
    DispatchFailure,
    Engine,
    Sync,
    NotFound,
    IllegalTransition,
    RelaySession,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid task id: {0}")]
    InvalidTaskId(String),
    #[error("illegal state transition to {to:?} from {from:?}")]
    IllegalTransition {
        from: crate::task::TaskStatus,
        to: crate::task::TaskStatus,
    },
}
