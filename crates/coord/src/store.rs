// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `CoordStore` trait: everything the engine asks of the coordination
//! store, small enough to fake in tests.

use crate::error::CoordError;
use async_trait::async_trait;
use gaffer_core::{WorkerEntry, WorkerId};
use std::time::Duration;

#[async_trait]
pub trait CoordStore: Send + Sync {
    /// Atomic set-if-absent with TTL. Returns true only on a fresh
    /// acquisition; an existing key returns false even when `holder` owns
    /// it (use [`renew`](CoordStore::renew) to extend).
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, CoordError>;

    /// Extend a lease iff `holder` still owns it (compare-and-swap).
    async fn renew(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, CoordError>;

    /// Drop a lease iff `holder` still owns it.
    async fn release(&self, key: &str, holder: &str) -> Result<(), CoordError>;

    /// Atomic integer increment; creates the counter at 0 first.
    async fn incr(&self, key: &str) -> Result<i64, CoordError>;

    async fn put(&self, key: &str, value: &str) -> Result<(), CoordError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CoordError>;

    async fn set_flag(&self, key: &str) -> Result<(), CoordError>;

    async fn get_flag(&self, key: &str) -> Result<bool, CoordError>;

    async fn clear_flag(&self, key: &str) -> Result<(), CoordError>;

    /// Write (or refresh) a worker's directory entry with a TTL.
    async fn write_entry(&self, entry: &WorkerEntry, ttl: Duration) -> Result<(), CoordError>;

    /// Remove a worker's directory entry immediately (shutdown flushes the
    /// TTL to zero so followers detect loss quickly).
    async fn drop_entry(&self, worker_id: &WorkerId) -> Result<(), CoordError>;

    /// All live directory entries.
    async fn scan_workers(&self) -> Result<Vec<WorkerEntry>, CoordError>;
}
