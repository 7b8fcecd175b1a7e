// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory coordination store for tests.
//!
//! Mirrors the Redis adapter's semantics (holder-checked renew/release,
//! TTL expiry), but time comes from a [`Clock`], so tests drive expiry by
//! advancing a `FakeClock`. A `fail_all` switch simulates a coordination
//! store outage.

use crate::error::CoordError;
use crate::keys;
use crate::store::CoordStore;
use async_trait::async_trait;
use gaffer_core::{Clock, FakeClock, WorkerEntry, WorkerId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Inner {
    /// key → (value, optional expiry in wall-clock ms)
    kv: HashMap<String, (String, Option<u64>)>,
    entries: HashMap<String, (WorkerEntry, u64)>,
    fail_all: bool,
}

#[derive(Clone)]
pub struct MemoryCoord {
    clock: FakeClock,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCoord {
    pub fn new(clock: FakeClock) -> Self {
        Self { clock, inner: Arc::new(Mutex::new(Inner::default())) }
    }

    /// Make every subsequent operation fail, as if the store were
    /// partitioned away.
    pub fn set_fail_all(&self, fail: bool) {
        self.inner.lock().fail_all = fail;
    }

    /// Drop a key outright, bypassing holder checks (test harness only).
    pub fn evict(&self, key: &str) {
        self.inner.lock().kv.remove(key);
    }

    fn check(&self, inner: &Inner) -> Result<(), CoordError> {
        if inner.fail_all {
            return Err(CoordError::Backend("injected failure".to_string()));
        }
        Ok(())
    }

    fn live_value<'a>(inner: &'a Inner, key: &str, now_ms: u64) -> Option<&'a str> {
        match inner.kv.get(key) {
            Some((value, expiry)) if expiry.map_or(true, |at| at > now_ms) => Some(value),
            _ => None,
        }
    }
}

#[async_trait]
impl CoordStore for MemoryCoord {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, CoordError> {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        self.check(&inner)?;
        if Self::live_value(&inner, key, now_ms).is_some() {
            return Ok(false);
        }
        inner
            .kv
            .insert(key.to_string(), (holder.to_string(), Some(now_ms + ttl.as_millis() as u64)));
        Ok(true)
    }

    async fn renew(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, CoordError> {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        self.check(&inner)?;
        if Self::live_value(&inner, key, now_ms) != Some(holder) {
            return Ok(false);
        }
        inner
            .kv
            .insert(key.to_string(), (holder.to_string(), Some(now_ms + ttl.as_millis() as u64)));
        Ok(true)
    }

    async fn release(&self, key: &str, holder: &str) -> Result<(), CoordError> {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        self.check(&inner)?;
        if Self::live_value(&inner, key, now_ms) == Some(holder) {
            inner.kv.remove(key);
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, CoordError> {
        let mut inner = self.inner.lock();
        self.check(&inner)?;
        // Counters live in the plain keyspace, like Redis INCR keys.
        let next = inner
            .kv
            .get(key)
            .and_then(|(value, _)| value.parse::<i64>().ok())
            .unwrap_or(0)
            + 1;
        inner.kv.insert(key.to_string(), (next.to_string(), None));
        Ok(next)
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CoordError> {
        let mut inner = self.inner.lock();
        self.check(&inner)?;
        inner.kv.insert(key.to_string(), (value.to_string(), None));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordError> {
        let now_ms = self.clock.epoch_ms();
        let inner = self.inner.lock();
        self.check(&inner)?;
        Ok(Self::live_value(&inner, key, now_ms).map(str::to_string))
    }

    async fn set_flag(&self, key: &str) -> Result<(), CoordError> {
        self.put(key, "1").await
    }

    async fn get_flag(&self, key: &str) -> Result<bool, CoordError> {
        Ok(self.get(key).await?.as_deref() == Some("1"))
    }

    async fn clear_flag(&self, key: &str) -> Result<(), CoordError> {
        let mut inner = self.inner.lock();
        self.check(&inner)?;
        inner.kv.remove(key);
        Ok(())
    }

    async fn write_entry(&self, entry: &WorkerEntry, ttl: Duration) -> Result<(), CoordError> {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        self.check(&inner)?;
        inner.entries.insert(
            keys::worker_entry(&entry.worker_id),
            (entry.clone(), now_ms + ttl.as_millis() as u64),
        );
        Ok(())
    }

    async fn drop_entry(&self, worker_id: &WorkerId) -> Result<(), CoordError> {
        let mut inner = self.inner.lock();
        self.check(&inner)?;
        inner.entries.remove(&keys::worker_entry(worker_id));
        Ok(())
    }

    async fn scan_workers(&self) -> Result<Vec<WorkerEntry>, CoordError> {
        let now_ms = self.clock.epoch_ms();
        let inner = self.inner.lock();
        self.check(&inner)?;
        let mut entries: Vec<WorkerEntry> = inner
            .entries
            .values()
            .filter(|(_, expires)| *expires > now_ms)
            .map(|(entry, _)| entry.clone())
            .collect();
        entries.sort_by(|a, b| a.worker_id.as_str().cmp(b.worker_id.as_str()));
        Ok(entries)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
