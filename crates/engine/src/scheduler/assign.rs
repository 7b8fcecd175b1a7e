// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assignment: pair due PENDING runs (and reassignable ORPHANED runs)
//! with candidate workers.

use super::{BATCH_LIMIT, RUN_LEASE_TTL};
use crate::error::RuntimeError;
use crate::runtime::WorkerRuntime;
use chrono::Duration as ChronoDuration;
use gaffer_coord::keys;
use gaffer_core::{Clock, JobRun, Role, RunState, Tunables, WorkerEntry};
use gaffer_store::{RunGuard, RunPatch};
use std::collections::HashMap;
use tracing::debug;

impl<C: Clock> WorkerRuntime<C> {
    pub(crate) async fn assign(&self, tunables: &Tunables) -> Result<(), RuntimeError> {
        let now = self.clock.now_utc();
        let due = now + ChronoDuration::seconds(tunables.assign_ahead_seconds);

        let pending = self.store.runs_in_state(RunState::Pending, Some(due), BATCH_LIMIT).await?;
        let orphaned = self.store.runs_in_state(RunState::Orphaned, None, BATCH_LIMIT).await?;
        if pending.is_empty() && orphaned.is_empty() {
            return Ok(());
        }

        let mut pool = self.candidate_pool(tunables).await?;
        if pool.is_empty() {
            debug!("no assignment candidates");
            return Ok(());
        }
        let (leader_id, epoch) =
            self.lock_state(|state| (state.worker_id.clone(), state.leader_epoch));

        for run in pending {
            let guard = RunGuard::new(RunState::Pending, run.version);
            let patch = |worker: gaffer_core::WorkerId| RunPatch::assign(worker, now, epoch);
            self.assign_one(&run, &guard, patch, &mut pool, &leader_id).await?;
        }

        let definitions = self.store.list_definitions().await?;
        let max_retries: HashMap<String, u32> = definitions
            .iter()
            .map(|d| (d.id.to_string(), d.max_retries))
            .collect();
        let backoff: HashMap<String, i64> = definitions
            .iter()
            .map(|d| (d.id.to_string(), i64::from(d.retry_backoff_seconds)))
            .collect();

        for run in orphaned {
            let def_key = run.definition_id.to_string();
            let cap = max_retries.get(&def_key).copied().unwrap_or(0);
            if run.attempt as u32 > cap {
                // Attempts exhausted: the row stays orphaned until an
                // operator raises the definition's retry cap.
                continue;
            }
            // Backoff beyond the first reassignment, measured from the
            // dead assignment.
            if let Some(assigned_at) = run.assigned_at {
                let pause = tunables.reassign_after_seconds
                    + backoff.get(&def_key).copied().unwrap_or(0) * i64::from(run.attempt - 1);
                if now < assigned_at + ChronoDuration::seconds(pause) {
                    continue;
                }
            }
            let guard = RunGuard::new(RunState::Orphaned, run.version);
            let attempt = run.attempt + 1;
            let patch =
                |worker: gaffer_core::WorkerId| RunPatch::reassign(worker, now, epoch, attempt);
            self.assign_one(&run, &guard, patch, &mut pool, &leader_id).await?;
        }
        Ok(())
    }

    /// Directory entries eligible for new work, best first. The leader is
    /// excluded unless it is the only candidate.
    async fn candidate_pool(&self, tunables: &Tunables) -> Result<Vec<WorkerEntry>, RuntimeError> {
        let now_ms = self.clock.epoch_ms();
        let mut pool: Vec<WorkerEntry> = self
            .coord
            .scan_workers()
            .await?
            .into_iter()
            .filter(|e| {
                e.is_candidate(now_ms, tunables.heartbeat_ttl_seconds, tunables.max_jobs_per_worker)
            })
            .collect();
        let non_leader: Vec<WorkerEntry> =
            pool.iter().filter(|e| e.role != Role::Leader).cloned().collect();
        if !non_leader.is_empty() {
            pool = non_leader;
        }
        sort_candidates(&mut pool);
        Ok(pool)
    }

    /// Lease the run, then take the conditional transition. A miss means
    /// another updater won; the lease is dropped and the run skipped.
    async fn assign_one(
        &self,
        run: &JobRun,
        guard: &RunGuard,
        patch: impl FnOnce(gaffer_core::WorkerId) -> RunPatch,
        pool: &mut Vec<WorkerEntry>,
        leader_id: &gaffer_core::WorkerId,
    ) -> Result<(), RuntimeError> {
        let Some(choice) = pool.first().cloned() else {
            return Ok(());
        };

        let lease_key = keys::run_lease(&run.id);
        let leased = self.coord.try_acquire(&lease_key, leader_id.as_str(), RUN_LEASE_TTL).await?
            || self.coord.renew(&lease_key, leader_id.as_str(), RUN_LEASE_TTL).await?;
        if !leased {
            debug!(run_id = %run.id, "run lease held elsewhere, skipping");
            return Ok(());
        }

        let rows =
            self.store.update_run(&run.id, guard, &patch(choice.worker_id.clone())).await?;
        if rows == 0 {
            self.coord.release(&lease_key, leader_id.as_str()).await?;
            debug!(run_id = %run.id, "assignment lost the conditional update");
            return Ok(());
        }

        // Account the new load locally so later picks this tick spread out.
        if let Some(entry) = pool.iter_mut().find(|e| e.worker_id == choice.worker_id) {
            entry.load += 1;
        }
        sort_candidates(pool);
        Ok(())
    }
}

/// Score: load ascending, then freshest heartbeat, then lowest id for
/// determinism.
pub(crate) fn sort_candidates(pool: &mut [WorkerEntry]) {
    pool.sort_by(|a, b| {
        a.load
            .cmp(&b.load)
            .then(b.last_heartbeat_ms.cmp(&a.last_heartbeat_ms))
            .then(a.worker_id.as_str().cmp(b.worker_id.as_str()))
    });
}
