// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task/batch/gpu identifiers.
//!
//! `TaskId` is a 64-bit, monotonic, time-sortable identifier:
//! the high 42 bits are milliseconds since [`EPOCH_MS`], the low 22 bits are
//! a per-millisecond counter that resets every tick. This gives ~139 years
//! of range and up to ~4.1M ids per millisecond before the counter itself
//! has to wait for the clock to advance.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::clock::Clock;

/// Custom epoch (2024-01-01T00:00:00Z) so the 42-bit timestamp field has
/// headroom; using the Unix epoch directly would burn decades of range.
pub const EPOCH_MS: u64 = 1_704_067_200_000;

const COUNTER_BITS: u32 = 22;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;

/// Unique, time-sortable task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(TaskId)
    }
}

/// Identifier shared by every task instance produced by one submission.
///
/// Reuses the `u64` task-id space: the first task id minted in a batch
/// doubles as its batch id.
pub type BatchId = TaskId;

/// GPU identifier, scoped to a single node's inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct GpuId(pub u32);

impl std::fmt::Display for GpuId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generates task ids. Implementations must guarantee strictly increasing
/// ids across calls on the same instance, so created task ids stay
/// strictly increasing in target input order.
pub trait TaskIdGen: Send + Sync {
    fn next(&self) -> TaskId;
}

/// Production generator: millisecond timestamp + per-millisecond counter.
pub struct SystemTaskIdGen<C: Clock> {
    clock: C,
    last_ms: AtomicU64,
    counter: AtomicU32,
}

impl<C: Clock> SystemTaskIdGen<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last_ms: AtomicU64::new(0),
            counter: AtomicU32::new(0),
        }
    }
}

impl<C: Clock> TaskIdGen for SystemTaskIdGen<C> {
    fn next(&self) -> TaskId {
        let now = self.clock.now_ms().saturating_sub(EPOCH_MS);
        let prev = self.last_ms.swap(now, Ordering::SeqCst);
        let seq = if prev == now {
            self.counter.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.counter.store(0, Ordering::SeqCst);
            0
        };
        TaskId((now << COUNTER_BITS) | (seq as u64 & COUNTER_MASK))
    }
}

/// Test-only generator: a plain, predictable, strictly increasing counter.
pub struct SequentialTaskIdGen {
    next: AtomicU64,
}

impl SequentialTaskIdGen {
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl Default for SequentialTaskIdGen {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TaskIdGen for SequentialTaskIdGen {
    fn next(&self) -> TaskId {
        TaskId(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

crate::define_id! {
    /// Node hostname; unique and case-sensitive.
    pub struct Hostname;
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
