// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The atomic task-transition primitive.
//!
//! Every lifecycle command (kill/pause/resume, dispatch outcome, runner
//! status ingest) goes through [`Store::transition_task`] rather than
//! writing `task.status` directly, so exactly one terminal transition can
//! ever succeed per task.

use haku_core::{TaskId, TaskStatus};

use crate::Store;

impl Store {
    /// Atomically move `task_id` to `to` iff its current status is a member
    /// of `allowed`. `update` is applied to the task's other fields only
    /// when the guard matches. Returns whether the transition happened.
    ///
    /// A non-matching call is a no-op: it does not append an event, and the
    /// caller is expected to log a warning.
    pub fn transition_task(
        &self,
        task_id: TaskId,
        allowed: &[TaskStatus],
        to: TaskStatus,
        at_ms: u64,
        update: impl FnOnce(&mut TransitionFields),
    ) -> Result<bool, crate::StoreError> {
        let mut fields = TransitionFields::default();
        update(&mut fields);

        let mut inner = self.inner.lock();
        let current = match inner.state.task(task_id) {
            Some(t) => t.status,
            None => return Ok(false),
        };
        if !allowed.contains(&current) {
            tracing::warn!(
                task_id = %task_id,
                from = ?current,
                to = ?to,
                "illegal task transition requested, ignoring"
            );
            return Ok(false);
        }

        let event = crate::events::Event::TaskStatusChanged {
            task_id,
            to,
            at_ms,
            exit_code: fields.exit_code,
            error_message: fields.error_message,
            ssh_port: fields.ssh_port,
            assigned_unit_name: fields.assigned_unit_name,
        };
        inner.append_and_apply(event)?;
        Ok(true)
    }
}

/// Optional fields an atomic transition may also set, gathered from the
/// caller-supplied closure so the guard check and the field write happen
/// under the same lock acquisition.
#[derive(Default)]
pub struct TransitionFields {
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
    pub ssh_port: Option<u16>,
    pub assigned_unit_name: Option<String>,
}

impl TransitionFields {
    pub fn exit_code(&mut self, v: i32) -> &mut Self {
        self.exit_code = Some(v);
        self
    }

    pub fn error(&mut self, msg: impl Into<String>) -> &mut Self {
        self.error_message = Some(msg.into());
        self
    }

    pub fn ssh_port(&mut self, port: u16) -> &mut Self {
        self.ssh_port = Some(port);
        self
    }

    pub fn unit_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.assigned_unit_name = Some(name.into());
        self
    }
}
