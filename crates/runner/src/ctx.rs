// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared context injected into every runner HTTP handler
//!: one `Arc<RunnerCtx>` built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use haku_core::TaskId;
use haku_resource::{ContainerEngine, EnvironmentSync};
use parking_lot::Mutex;

use crate::config::Config;

/// What the runner remembers about one dispatched task: its unit id plus
/// which engine launched it, so a later `/kill|pause|resume` picks the
/// same engine back up.
#[derive(Debug, Clone)]
pub struct UnitHandle {
    pub unit_id: String,
    pub container_env_name: Option<String>,
}

/// Runner-side state: the engine adapter, the in-memory `task_id ->
/// unit_id` map, and the environment sync cache.
pub struct RunnerCtx {
    /// The primary engine (Docker in production) for named environments.
    pub engine: Arc<dyn ContainerEngine>,
    /// The OS-service-unit fallback, selected when a run order's
    /// `container_env_name` is the `"NONE"` sentinel.
    pub fallback_engine: Arc<dyn ContainerEngine>,
    pub tasks: Mutex<HashMap<TaskId, UnitHandle>>,
    pub host_client: reqwest::Client,
    pub config: Config,
    pub env_sync: EnvironmentSync,
}

impl RunnerCtx {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        fallback_engine: Arc<dyn ContainerEngine>,
        config: Config,
    ) -> Arc<Self> {
        let env_sync = EnvironmentSync::new(config.env_archives_dir());
        Arc::new(Self {
            engine,
            fallback_engine,
            tasks: Mutex::new(HashMap::new()),
            host_client: reqwest::Client::new(),
            config,
            env_sync,
        })
    }

    /// Selects the engine named by a run order's `container_env_name`.
    pub fn engine_for(&self, container_env_name: Option<&str>) -> &Arc<dyn ContainerEngine> {
        match container_env_name {
            Some("NONE") => &self.fallback_engine,
            _ => &self.engine,
        }
    }

    pub fn remember_unit(&self, task_id: TaskId, unit_id: String, container_env_name: Option<String>) {
        self.tasks.lock().insert(task_id, UnitHandle { unit_id, container_env_name });
    }

    pub fn unit_for(&self, task_id: TaskId) -> Option<UnitHandle> {
        self.tasks.lock().get(&task_id).cloned()
    }

    pub fn forget(&self, task_id: TaskId) {
        self.tasks.lock().remove(&task_id);
    }
}

#[cfg(test)]
pub(crate) fn test_ctx(dir: &std::path::Path, engine: Arc<dyn ContainerEngine>) -> Arc<RunnerCtx> {
    RunnerCtx::new(Arc::clone(&engine), engine, crate::config::Config::for_tests(dir))
}
