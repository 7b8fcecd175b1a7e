// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orphan reconciliation: ASSIGNED runs whose worker is lost become
//! ORPHANED, then the assignment pass hands them to a fresh candidate.

use super::BATCH_LIMIT;
use crate::error::RuntimeError;
use crate::runtime::WorkerRuntime;
use chrono::Duration as ChronoDuration;
use gaffer_core::{Clock, ContinuationState, RunState, Tunables};
use gaffer_store::{RunGuard, RunPatch};
use std::collections::HashMap;
use tracing::info;

impl<C: Clock> WorkerRuntime<C> {
    pub(crate) async fn reconcile(&self, tunables: &Tunables) -> Result<(), RuntimeError> {
        let now = self.clock.now_utc();
        let now_ms = self.clock.epoch_ms();
        let assigned = self.store.runs_in_state(RunState::Assigned, None, BATCH_LIMIT * 4).await?;
        if assigned.is_empty() {
            return Ok(());
        }

        let directory: HashMap<String, _> = self
            .coord
            .scan_workers()
            .await?
            .into_iter()
            .map(|e| (e.worker_id.to_string(), e))
            .collect();

        for run in assigned {
            // A still-reachable worker is asking whether it may finish;
            // reassignment must not race it.
            if run.continuation_state == ContinuationState::Confirming {
                continue;
            }
            let Some(assigned_at) = run.assigned_at else {
                continue;
            };
            if now < assigned_at + ChronoDuration::seconds(tunables.reassign_after_seconds) {
                continue;
            }
            let Some(worker) = run.assigned_worker_id.as_ref() else {
                continue;
            };
            let lost = match directory.get(worker.as_str()) {
                None => true,
                Some(entry) => {
                    entry.detached || !entry.is_fresh(now_ms, tunables.heartbeat_ttl_seconds)
                }
            };
            if !lost {
                continue;
            }

            let guard = RunGuard::new(RunState::Assigned, run.version);
            if self.store.update_run(&run.id, &guard, &RunPatch::orphan()).await? == 1 {
                info!(run_id = %run.id, worker = %worker, "assigned run orphaned");
            }
        }
        Ok(())
    }
}
