// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `FakeEngine`: records calls for assertions instead of touching a real
//! container runtime.

use std::collections::HashMap;
use parking_lot::Mutex;

use async_trait::async_trait;

use super::{ContainerEngine, EngineError, ExecStream, InspectResult, RunSpec, UnitState};

#[derive(Debug, Clone)]
pub enum EngineCall {
    RunEphemeral(String),
    RunPersistentSsh(String),
    Stop(String),
    Pause(String),
    Unpause(String),
    LoadImage(String),
    CommitAndSave(String),
}

#[derive(Default)]
struct Inner {
    calls: Vec<EngineCall>,
    units: HashMap<String, InspectResult>,
    loaded_images: Vec<String>,
    next_ssh_port: u16,
    fail_name_conflict: Option<String>,
}

/// A fake [`ContainerEngine`] for deterministic unit tests, recording every
/// call it receives and letting tests script `inspect` results.
pub struct FakeEngine {
    inner: Mutex<Inner>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_ssh_port: 32768,
                ..Default::default()
            }),
        }
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner.lock().calls.clone()
    }

    pub fn loaded_images(&self) -> Vec<String> {
        self.inner.lock().loaded_images.clone()
    }

    pub fn set_exit(&self, unit_id: &str, exit_code: i32, oom_killed: bool) {
        self.inner.lock().units.insert(
            unit_id.to_string(),
            InspectResult {
                state: UnitState::Exited,
                exit_code: Some(exit_code),
                oom_killed,
            },
        );
    }

    pub fn fail_name_conflict(&self, name: &str) {
        self.inner.lock().fail_name_conflict = Some(name.to_string());
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn run_ephemeral(&self, spec: RunSpec) -> Result<String, EngineError> {
        let mut inner = self.inner.lock();
        if inner.fail_name_conflict.as_deref() == Some(spec.name.as_str()) {
            return Err(EngineError::NameConflict(spec.name));
        }
        inner.calls.push(EngineCall::RunEphemeral(spec.name.clone()));
        inner.units.insert(
            spec.name.clone(),
            InspectResult {
                state: UnitState::Running,
                exit_code: None,
                oom_killed: false,
            },
        );
        Ok(spec.name)
    }

    async fn run_persistent_ssh(
        &self,
        spec: RunSpec,
        _ssh_pubkey: &str,
    ) -> Result<(String, u16), EngineError> {
        let mut inner = self.inner.lock();
        if inner.fail_name_conflict.as_deref() == Some(spec.name.as_str()) {
            return Err(EngineError::NameConflict(spec.name));
        }
        inner
            .calls
            .push(EngineCall::RunPersistentSsh(spec.name.clone()));
        inner.units.insert(
            spec.name.clone(),
            InspectResult {
                state: UnitState::Running,
                exit_code: None,
                oom_killed: false,
            },
        );
        let port = inner.next_ssh_port;
        inner.next_ssh_port += 1;
        Ok((spec.name, port))
    }

    async fn stop(&self, unit_id: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        inner.calls.push(EngineCall::Stop(unit_id.to_string()));
        inner.units.remove(unit_id);
        Ok(())
    }

    async fn pause(&self, unit_id: &str) -> Result<(), EngineError> {
        self.inner
            .lock()
            .calls
            .push(EngineCall::Pause(unit_id.to_string()));
        Ok(())
    }

    async fn unpause(&self, unit_id: &str) -> Result<(), EngineError> {
        self.inner
            .lock()
            .calls
            .push(EngineCall::Unpause(unit_id.to_string()));
        Ok(())
    }

    async fn exec(&self, _unit_id: &str, _cmd: &str) -> Result<ExecStream, EngineError> {
        let (_a, reader) = tokio::io::duplex(1024);
        let (writer, _b) = tokio::io::duplex(1024);
        Ok(ExecStream {
            stdin: Box::new(writer),
            stdout: Box::new(reader),
        })
    }

    async fn load_image(&self, archive_path: &str) -> Result<(), EngineError> {
        self.inner
            .lock()
            .loaded_images
            .push(archive_path.to_string());
        Ok(())
    }

    async fn commit_and_save(
        &self,
        unit_id: &str,
        _name: &str,
        _archive_path: &str,
    ) -> Result<(), EngineError> {
        self.inner
            .lock()
            .calls
            .push(EngineCall::CommitAndSave(unit_id.to_string()));
        Ok(())
    }

    async fn inspect(&self, unit_id: &str) -> Result<InspectResult, EngineError> {
        Ok(self
            .inner
            .lock()
            .units
            .get(unit_id)
            .cloned()
            .unwrap_or(InspectResult {
                state: UnitState::NotFound,
                exit_code: None,
                oom_killed: false,
            }))
    }
}
