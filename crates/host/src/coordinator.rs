// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task Coordinator & Lifecycle: the operations exposed
//! to HTTP handlers. Thin glue over the resolver, the dispatcher, and the
//! store's atomic transition primitive — no lifecycle decision is made
//! here that the store's `allowed_predecessors` table doesn't already
//! encode.

use std::sync::Arc;

use haku_core::{Task, TaskId, TaskStatus};
use haku_proto::{ReportedStatus, SubmitRequest, SubmitResponse};
use haku_store::Store;
use tracing::warn;

use crate::dispatcher::Dispatcher;
use crate::error::CoordinatorError;
use crate::resolver;

pub struct Coordinator {
    pub store: Arc<Store>,
    pub dispatcher: Arc<Dispatcher>,
    pub http: reqwest::Client,
    pub config: crate::config::Config,
}

impl Coordinator {
    pub fn new(
        store: Arc<Store>,
        dispatcher: Arc<Dispatcher>,
        http: reqwest::Client,
        config: crate::config::Config,
    ) -> Self {
        Self { store, dispatcher, http, config }
    }

    /// Resolves and admits a submission, then spawns one dispatch attempt
    /// per created task so the caller never blocks on runner I/O.
    pub fn submit(
        &self,
        id_gen: &dyn haku_core::TaskIdGen,
        req: &SubmitRequest,
        now_ms: u64,
    ) -> Result<SubmitResponse, crate::error::AdmissionError> {
        let outcome = resolver::resolve_submission(&self.store, id_gen, req, now_ms)?;

        // `resolve_submission` already persisted each created task as it
        // admitted it; this loop only collects ids to dispatch.
        let mut created_task_ids = Vec::with_capacity(outcome.created.len());
        for task in &outcome.created {
            created_task_ids.push(task.task_id);
        }
        for &task_id in &created_task_ids {
            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(dispatcher.dispatch(task_id));
        }

        Ok(SubmitResponse { created_task_ids, failed_targets: outcome.failed })
    }

    pub fn status(&self, task_id: TaskId) -> Result<Task, CoordinatorError> {
        self.store.task(task_id).ok_or(CoordinatorError::NotFound(task_id))
    }

    /// Stops a task. Terminal tasks are a no-op. A live
    /// task is sent a stop request and marked `killed` locally; if the
    /// runner later reports a different terminal status first, the
    /// store's "first terminal wins" rule keeps whichever arrived first.
    pub async fn kill(&self, task_id: TaskId, now_ms: u64) -> Result<(), CoordinatorError> {
        let task = self.store.task(task_id).ok_or(CoordinatorError::NotFound(task_id))?;
        if task.is_terminal() {
            return Ok(());
        }

        if !matches!(task.status, TaskStatus::Pending) {
            self.notify_runner(&task, "kill").await;
        }

        let allowed = [TaskStatus::Pending, TaskStatus::Assigning, TaskStatus::Running, TaskStatus::Paused];
        match self.store.transition_task(task_id, &allowed, TaskStatus::Killed, now_ms, |_| {}) {
            Ok(true) => {}
            Ok(false) => warn!(task_id = %task_id, "kill: task left the allowed states before the transition landed"),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Only valid while `running`.
    pub async fn pause(&self, task_id: TaskId, now_ms: u64) -> Result<(), CoordinatorError> {
        let task = self.store.task(task_id).ok_or(CoordinatorError::NotFound(task_id))?;
        self.notify_runner(&task, "pause").await;
        self.store
            .transition_task(task_id, &[TaskStatus::Running], TaskStatus::Paused, now_ms, |_| {})
            .map(|_| ())
            .map_err(Into::into)
    }

    /// Only valid while `paused`.
    pub async fn resume(&self, task_id: TaskId, now_ms: u64) -> Result<(), CoordinatorError> {
        let task = self.store.task(task_id).ok_or(CoordinatorError::NotFound(task_id))?;
        self.notify_runner(&task, "resume").await;
        self.store
            .transition_task(task_id, &[TaskStatus::Paused], TaskStatus::Running, now_ms, |_| {})
            .map(|_| ())
            .map_err(Into::into)
    }

    /// Applies a runner-reported status change. Whitelisted to the
    /// transitions a runner is allowed to report; anything else is a
    /// no-op logged at `warn`.
    pub fn ingest_status(
        &self,
        task_id: TaskId,
        status: ReportedStatus,
        exit_code: Option<i32>,
        error: Option<String>,
        ssh_port: Option<u16>,
        unit_id: Option<String>,
        now_ms: u64,
    ) -> Result<bool, CoordinatorError> {
        let (allowed, to): (&[TaskStatus], TaskStatus) = match status {
            ReportedStatus::Running => (&[TaskStatus::Assigning], TaskStatus::Running),
            ReportedStatus::Completed => (&[TaskStatus::Running], TaskStatus::Completed),
            ReportedStatus::Failed => (&[TaskStatus::Assigning, TaskStatus::Running], TaskStatus::Failed),
            ReportedStatus::Killed => {
                (&[TaskStatus::Assigning, TaskStatus::Running, TaskStatus::Paused], TaskStatus::Killed)
            }
            ReportedStatus::KilledOom => (&[TaskStatus::Running], TaskStatus::KilledOom),
        };

        let applied = self.store.transition_task(task_id, allowed, to, now_ms, |fields| {
            if let Some(code) = exit_code {
                fields.exit_code(code);
            }
            if let Some(msg) = &error {
                fields.error(msg.clone());
            }
            if let Some(port) = ssh_port {
                fields.ssh_port(port);
            }
            if let Some(id) = &unit_id {
                fields.unit_name(id.clone());
            }
        })?;

        if !applied {
            warn!(task_id = %task_id, ?status, "status ingest ignored: task not in an allowed predecessor state");
        }
        Ok(applied)
    }

    /// Reads the log file recorded on the task record at dispatch time.
    pub async fn fetch_log(&self, task_id: TaskId, stream: LogStream) -> Result<Vec<u8>, CoordinatorError> {
        let task = self.store.task(task_id).ok_or(CoordinatorError::NotFound(task_id))?;
        let path = match stream {
            LogStream::Stdout => task.stdout_path,
            LogStream::Stderr => task.stderr_path,
        };
        let path = path.ok_or_else(|| CoordinatorError::LogUnreadable("no log recorded for task".to_string()))?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| CoordinatorError::LogUnreadable(e.to_string()))
    }

    async fn notify_runner(&self, task: &Task, action: &'static str) {
        let Some(node) = self.store.node(&task.target_hostname) else {
            warn!(task_id = %task.task_id, action, "lifecycle notify skipped: node not found");
            return;
        };
        let url = format!("http://{}/{}/{}", node.endpoint, action, task.task_id);
        if let Err(e) = self.http.post(&url).send().await {
            warn!(task_id = %task.task_id, action, error = %e, "lifecycle notify failed, relying on heartbeat reconciliation");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
