// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment Sync: on a runner, materializes a named
//! environment archive from shared storage into the local engine, keyed by
//! a monotonic version tag (the archive's unix-timestamp suffix).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use crate::engine::ContainerEngine;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no archive found for environment {0}")]
    NoArchiveFound(String),
    #[error("archive unreadable: {0}")]
    ArchiveUnreadable(String),
    #[error("engine failed to load archive: {0}")]
    EngineLoadFailed(String),
}

/// Scans `<root>/<envs_dir>/` for files named `<name>.<timestamp>.<ext>`
/// and returns the one with the highest timestamp.
pub fn scan_latest(envs_dir: &Path, name: &str) -> Result<Option<(u64, PathBuf)>, SyncError> {
    let entries = std::fs::read_dir(envs_dir)
        .map_err(|e| SyncError::ArchiveUnreadable(format!("{}: {e}", envs_dir.display())))?;

    let prefix = format!("{name}.");
    let mut best: Option<(u64, PathBuf)> = None;

    for entry in entries {
        let entry = entry.map_err(|e| SyncError::ArchiveUnreadable(e.to_string()))?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(rest) = file_name.strip_prefix(&prefix) else {
            continue;
        };
        let Some(ts_str) = rest.split('.').next() else {
            continue;
        };
        let Ok(ts) = ts_str.parse::<u64>() else {
            continue;
        };
        if best.as_ref().map(|(best_ts, _)| ts > *best_ts).unwrap_or(true) {
            best = Some((ts, entry.path()));
        }
    }

    Ok(best)
}

/// Tracks, per environment name, the timestamp last loaded into the local
/// engine — so a matching canonical timestamp skips re-loading.
#[derive(Default)]
pub struct LoadedCache {
    loaded: Mutex<HashMap<String, u64>>,
}

impl LoadedCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, name: &str) -> Option<u64> {
        self.loaded.lock().get(name).copied()
    }

    fn set(&self, name: &str, ts: u64) {
        self.loaded.lock().insert(name.to_string(), ts);
    }
}

/// Serializes sync operations per environment name so concurrent tasks
/// requesting the same environment do not double-load it.
pub struct EnvironmentSync {
    envs_dir: PathBuf,
    cache: LoadedCache,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl EnvironmentSync {
    pub fn new(envs_dir: PathBuf) -> Self {
        Self {
            envs_dir,
            cache: LoadedCache::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, name: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Ensure the newest archive for `name` is loaded in `engine`. Returns
    /// the canonical timestamp now resident locally.
    pub async fn sync(
        &self,
        name: &str,
        engine: &dyn ContainerEngine,
    ) -> Result<u64, SyncError> {
        let per_name_lock = self.lock_for(name);
        let _guard = per_name_lock.lock().await;

        let (canonical_ts, path) = scan_latest(&self.envs_dir, name)?
            .ok_or_else(|| SyncError::NoArchiveFound(name.to_string()))?;

        if self.cache.get(name) == Some(canonical_ts) {
            return Ok(canonical_ts);
        }

        let path_str = path.to_string_lossy().to_string();
        engine
            .load_image(&path_str)
            .await
            .map_err(|e| SyncError::EngineLoadFailed(e.to_string()))?;

        self.cache.set(name, canonical_ts);
        Ok(canonical_ts)
    }
}

#[cfg(test)]
#[path = "envsync_tests.rs"]
mod tests;
