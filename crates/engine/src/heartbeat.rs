// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat loop and the detach lifecycle.
//!
//! Every interval the worker refreshes its directory entry and checks its
//! detach flag. A detached worker stops taking work, winds down its
//! current runs through the continuation protocol, and re-registers under
//! a fresh id once idle.

use crate::error::RuntimeError;
use crate::runtime::WorkerRuntime;
use gaffer_coord::keys;
use gaffer_core::{Clock, Role, WorkerId};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

impl<C: Clock> WorkerRuntime<C> {
    /// One pass of the heartbeat loop.
    pub async fn heartbeat_tick(self: &Arc<Self>) -> Result<(), RuntimeError> {
        let tunables = self.tunables().await;
        let ttl = Duration::from_secs(tunables.heartbeat_ttl_seconds.max(1) as u64);

        let entry = self.entry_snapshot();
        self.coord.write_entry(&entry, ttl).await?;

        // The detach flag is only honored once this incarnation is past
        // the grace age, so a stale flag cannot kill a fresh registration.
        let worker_id = entry.worker_id;
        let now_ms = self.clock.epoch_ms();
        let grace_ms = (tunables.worker_detach_grace_seconds.max(0) as u64) * 1000;
        let eligible = self.lock_state(|state| {
            !state.detached && now_ms.saturating_sub(state.registered_at_ms) >= grace_ms
        });
        if eligible && self.coord.get_flag(&keys::detach_flag(&worker_id)).await? {
            self.begin_detach().await?;
        }

        // A detached worker with nothing left in flight re-registers.
        let idle_and_detached =
            self.lock_state(|state| state.detached && state.runs.is_empty());
        if idle_and_detached {
            self.re_register(&worker_id).await?;
        }
        Ok(())
    }

    /// React to the detach flag: drop any role, stop accepting work, and
    /// start the continuation check for every in-flight run.
    pub(crate) async fn begin_detach(self: &Arc<Self>) -> Result<(), RuntimeError> {
        let (worker_id, role, run_ids) = self.lock_state_mut(|state| {
            state.detached = true;
            (state.worker_id.clone(), state.role, state.runs.keys().cloned().collect::<Vec<_>>())
        });
        info!(worker_id = %worker_id, in_flight = run_ids.len(), "detach observed");
        if role != Role::Worker {
            self.demote("detached").await;
        }
        for run_id in run_ids {
            let runtime = Arc::clone(self);
            tokio::spawn(async move {
                runtime.continuation_check(run_id).await;
            });
        }
        Ok(())
    }

    /// End the current incarnation and join the fleet under a new id.
    async fn re_register(self: &Arc<Self>, old_id: &WorkerId) -> Result<(), RuntimeError> {
        let tunables = self.tunables().await;
        let ttl = Duration::from_secs(tunables.heartbeat_ttl_seconds.max(1) as u64);

        let seq = self.coord.incr(keys::WORKER_ID_SEQ).await?;
        let new_id = WorkerId::from_seq(seq);
        let now_ms = self.clock.epoch_ms();
        self.lock_state_mut(|state| {
            state.worker_id = new_id.clone();
            state.detached = false;
            state.registered_at_ms = now_ms;
        });
        self.coord.drop_entry(old_id).await?;
        self.coord.clear_flag(&keys::detach_flag(old_id)).await?;
        self.coord.write_entry(&self.entry_snapshot(), ttl).await?;
        info!(old_id = %old_id, new_id = %new_id, "re-registered after detach");
        Ok(())
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
