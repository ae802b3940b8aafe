// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The State Store: a transactional, durable record of
//! nodes and task instances, single-writer on the host process.
//!
//! Durability follows a three-layer design: a JSONL
//! write-ahead log (`wal.rs`) buffers and group-commits events, a
//! background checkpoint (`snapshot.rs`) periodically persists the full
//! materialized state and truncates the WAL, and `MaterializedState`
//! (`state.rs`) is the in-memory projection every read goes through.
//! Every store error is treated by callers as fatal for the in-flight
//! operation.

use std::path::{Path, PathBuf};

use haku_core::{
    GpuDevice, Hostname, Node, NumaDomain, Task, TaskId, TaskStatus,
};
use parking_lot::Mutex;
use thiserror::Error;

use crate::events::Event;
use crate::snapshot::{Snapshot, SnapshotError};
use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

pub(crate) struct StoreInner {
    wal: Wal,
    state: MaterializedState,
    snapshot_path: PathBuf,
}

impl StoreInner {
    pub(crate) fn append_and_apply(&mut self, event: Event) -> Result<u64, StoreError> {
        let seq = self.wal.append(&event)?;
        self.state.apply_event(&event);
        self.wal.mark_processed(seq);
        Ok(seq)
    }
}

/// The State Store. Cheap to clone (wraps an `Arc`-free `Mutex` behind a
/// single owner); share it across handlers via `Arc<Store>`.
pub struct Store {
    pub(crate) inner: Mutex<StoreInner>,
}

impl Store {
    /// Open (or create) a store rooted at `wal_path`/`snapshot_path`,
    /// replaying the snapshot plus any WAL entries written after it.
    pub fn open(wal_path: &Path, snapshot_path: &Path) -> Result<Self, StoreError> {
        let (mut state, processed_seq) = match Snapshot::load(snapshot_path)? {
            Some(snap) => (snap.state, snap.seq),
            None => (MaterializedState::new(), 0),
        };

        let wal = Wal::open(wal_path, processed_seq)?;
        for entry in wal.entries_after(processed_seq)? {
            state.apply_event(&entry.event);
        }

        Ok(Self {
            inner: Mutex::new(StoreInner {
                wal,
                state,
                snapshot_path: snapshot_path.to_owned(),
            }),
        })
    }

    /// In-memory store with no WAL/snapshot backing, for tests.
    #[cfg(any(test, feature = "test-support"))]
    pub fn open_in_memory(dir: &Path) -> Result<Self, StoreError> {
        Self::open(&dir.join("events.wal"), &dir.join("snapshot.json"))
    }

    /// Flush buffered WAL entries to disk if the group-commit threshold has
    /// elapsed. Called periodically by the host's flush task.
    pub fn flush_if_needed(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.wal.needs_flush() {
            inner.wal.flush()?;
        }
        Ok(())
    }

    /// Write a checkpoint of the current state and truncate the WAL up to
    /// the processed sequence, following the write-tmp/fsync/rename
    /// ordering in `Snapshot::save`. Called periodically by the host.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.wal.flush()?;
        let seq = inner.wal.processed_seq();
        if seq == 0 {
            return Ok(());
        }
        let snapshot = Snapshot::new(seq, inner.state.clone());
        let path = inner.snapshot_path.clone();
        snapshot.save(&path)?;
        inner.wal.truncate_before(seq)?;
        Ok(())
    }

    // -- Node operations ----------------------------------------------

    pub fn create_or_update_node(
        &self,
        hostname: Hostname,
        endpoint: String,
        total_cores: u32,
        total_memory_bytes: u64,
        numa_topology: Vec<NumaDomain>,
        gpus: Vec<GpuDevice>,
        at_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let event = if inner.state.node(&hostname).is_some() {
            Event::NodeReregistered {
                hostname,
                endpoint,
                total_cores,
                total_memory_bytes,
                numa_topology,
                gpus,
                at_ms,
            }
        } else {
            Event::NodeRegistered {
                hostname,
                endpoint,
                total_cores,
                total_memory_bytes,
                numa_topology,
                gpus,
                at_ms,
            }
        };
        inner.append_and_apply(event)?;
        Ok(())
    }

    pub fn record_heartbeat(
        &self,
        hostname: Hostname,
        cpu_pct: f32,
        memory_pct: f32,
        numa_topology: Vec<NumaDomain>,
        gpus: Vec<GpuDevice>,
        at_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.append_and_apply(Event::HeartbeatReceived {
            hostname,
            cpu_pct,
            memory_pct,
            numa_topology,
            gpus,
            at_ms,
        })?;
        Ok(())
    }

    pub fn set_node_liveness(
        &self,
        hostname: Hostname,
        liveness: haku_core::NodeLiveness,
        at_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.append_and_apply(Event::NodeLivenessChanged {
            hostname,
            liveness,
            at_ms,
        })?;
        Ok(())
    }

    pub fn node(&self, hostname: &Hostname) -> Option<Node> {
        self.inner.lock().state.node(hostname).cloned()
    }

    pub fn list_nodes(&self) -> Vec<Node> {
        self.inner.lock().state.nodes.values().cloned().collect()
    }

    // -- Task operations ------------------------------------------------

    pub fn create_task(&self, task: Task) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.append_and_apply(Event::TaskCreated { task: Box::new(task) })?;
        Ok(())
    }

    pub fn mark_dispatched(&self, task_id: TaskId, at_ms: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.append_and_apply(Event::TaskDispatched { task_id, at_ms })?;
        Ok(())
    }

    pub fn increment_suspicion(&self, task_id: TaskId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.append_and_apply(Event::TaskSuspicionIncremented { task_id })?;
        Ok(())
    }

    pub fn set_task_paths(
        &self,
        task_id: TaskId,
        stdout_path: String,
        stderr_path: String,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.append_and_apply(Event::TaskPaths {
            task_id,
            stdout_path,
            stderr_path,
        })?;
        Ok(())
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.inner.lock().state.task(id).cloned()
    }

    pub fn tasks_by_status(&self, statuses: &[TaskStatus]) -> Vec<Task> {
        self.inner
            .lock()
            .state
            .tasks_by_status(statuses)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn tasks_by_hostname(&self, hostname: &Hostname) -> Vec<Task> {
        self.inner
            .lock()
            .state
            .tasks_by_hostname(hostname)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn active_vps_tasks(&self) -> Vec<Task> {
        self.inner
            .lock()
            .state
            .active_vps_tasks()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn busy_gpus(&self, hostname: &Hostname, excluding: Option<TaskId>) -> Vec<haku_core::GpuId> {
        self.inner.lock().state.busy_gpus(hostname, excluding)
    }

    pub fn reserved_cores(&self, hostname: &Hostname) -> u64 {
        self.inner.lock().state.reserved_cores(hostname)
    }

    pub fn reserved_memory_bytes(&self, hostname: &Hostname) -> u64 {
        self.inner.lock().state.reserved_memory_bytes(hostname)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
