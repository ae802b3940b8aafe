// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared context injected into every HTTP handler:
//! no ambient globals, a single `Arc<HostCtx>` constructed once at startup.

use std::sync::Arc;

use haku_core::{Clock, SystemClock, SystemTaskIdGen, TaskIdGen};
use haku_store::Store;

use crate::config::Config;

pub struct HostCtx {
    pub store: Arc<Store>,
    pub config: Config,
    pub http: reqwest::Client,
    pub clock: SystemClock,
    pub id_gen: Arc<dyn TaskIdGen>,
}

impl HostCtx {
    pub fn new(store: Arc<Store>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            http: reqwest::Client::new(),
            clock: SystemClock,
            id_gen: Arc::new(SystemTaskIdGen::new(SystemClock)),
        })
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

#[cfg(test)]
pub(crate) fn test_ctx(dir: &std::path::Path) -> Arc<HostCtx> {
    let store = Arc::new(
        Store::open_in_memory(dir).unwrap_or_else(|e| panic!("open_in_memory: {e}")),
    );
    HostCtx::new(store, crate::config::Config::for_tests(dir))
}
