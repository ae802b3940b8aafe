// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! haku-store: the State Store — a transactional,
//! durable record of nodes and task instances, single-writer on the host.

pub mod events;
pub mod snapshot;
pub mod state;
mod store;
pub mod transition;
pub mod wal;

pub use events::Event;
pub use snapshot::{Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::MaterializedState;
pub use store::{Store, StoreError};
pub use transition::TransitionFields;
pub use wal::{Wal, WalEntry, WalError};
