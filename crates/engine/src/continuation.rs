// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The continuation-under-detach protocol.
//!
//! A detached worker still running a job marks the run CONFIRMING (which
//! shields it from orphan scanning) and asks the leader, then the
//! sub-leader, whether it may finish. ALLOW_CONTINUE clears the mark and
//! the run proceeds on this worker; MUST_ABORT or exhausted retries kill
//! the subprocess and fail the run with a distinct summary.

use crate::error::RuntimeError;
use crate::runtime::WorkerRuntime;
use crate::scheduler::RPC_DEADLINE;
use crate::state::AbortCause;
use chrono::Duration as ChronoDuration;
use gaffer_coord::keys;
use gaffer_core::{Clock, ContinuationState, Epoch, Role, RunId, RunState, WorkerId};
use gaffer_store::{RunGuard, RunPatch};
use gaffer_wire::{ContinuationVerdict, Request, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

impl<C: Clock> WorkerRuntime<C> {
    /// Run the continuation check for one in-flight run of a detached
    /// worker. Spawned from the detach path; owns the run's fate.
    pub(crate) async fn continuation_check(self: &Arc<Self>, run_id: RunId) {
        let tunables = self.tunables().await;
        let retries = tunables.continuation_retry_count.max(1);
        let interval =
            Duration::from_secs_f64(tunables.continuation_retry_interval_seconds.max(0.0));

        let Some(dispatch_epoch) =
            self.lock_state(|state| state.runs.get(&run_id).map(|h| h.dispatch_epoch))
        else {
            return;
        };
        let worker_id = self.worker_id();

        // Mark CONFIRMING with a deadline covering the whole retry budget.
        let now = self.clock.now_utc();
        let budget = interval.as_secs_f64() * f64::from(retries) + RPC_DEADLINE.as_secs_f64();
        let deadline = now + ChronoDuration::milliseconds((budget * 1000.0) as i64);
        match self.store.get_run(&run_id).await {
            Ok(Some(run)) if run.state == RunState::Running => {
                let guard = RunGuard::new(RunState::Running, run.version)
                    .expected_worker(worker_id.clone());
                if self
                    .store
                    .update_run(&run_id, &guard, &RunPatch::confirming(now, deadline))
                    .await
                    .map_or(true, |rows| rows != 1)
                {
                    debug!(run_id = %run_id, "confirming mark missed; continuing anyway");
                }
            }
            Ok(_) => return,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "continuation: run read failed");
            }
        }
        info!(run_id = %run_id, worker_id = %worker_id, "asking to continue after detach");

        for attempt in 0..retries {
            for addr in self.coordinator_addrs().await {
                let request = Request::ConfirmContinuation {
                    worker_id: worker_id.clone(),
                    job_run_id: run_id.clone(),
                    leader_epoch: dispatch_epoch,
                    caller_role: Role::Worker,
                };
                match self.peers.call(&addr, request, RPC_DEADLINE).await {
                    Ok(Response::Continuation { verdict: ContinuationVerdict::AllowContinue }) => {
                        self.clear_confirming(&run_id, &worker_id).await;
                        info!(run_id = %run_id, "continuation allowed");
                        return;
                    }
                    Ok(Response::Continuation { verdict: ContinuationVerdict::MustAbort }) => {
                        self.abort_run(&run_id, "continuation denied").await;
                        return;
                    }
                    other => {
                        debug!(run_id = %run_id, addr, attempt, response = ?other, "continuation probe failed");
                    }
                }
            }
            tokio::time::sleep(interval).await;
        }
        self.abort_run(&run_id, "no coordinator reachable").await;
    }

    async fn clear_confirming(&self, run_id: &RunId, worker_id: &WorkerId) {
        if let Ok(Some(run)) = self.store.get_run(run_id).await {
            if run.continuation_state == ContinuationState::Confirming {
                let guard = RunGuard::new(run.state, run.version)
                    .expected_worker(worker_id.clone());
                let _ = self
                    .store
                    .update_run(run_id, &guard, &RunPatch::continuation_cleared())
                    .await;
            }
        }
    }

    /// Kill an in-flight run because continuation was denied (or nobody
    /// answered). The driver writes FAILED with the distinct summary.
    pub(crate) async fn abort_run(&self, run_id: &RunId, reason: &str) {
        let cancel = self.lock_state_mut(|state| {
            state.runs.get_mut(run_id).map(|handle| {
                handle.abort_cause =
                    Some(AbortCause::ContinuationAbort { reason: reason.to_string() });
                handle.cancel.clone()
            })
        });
        if let Some(cancel) = cancel {
            warn!(run_id = %run_id, reason, "aborting run after detach");
            cancel.cancel();
        }
    }

    /// Coordinator addresses, leader first, excluding this worker.
    async fn coordinator_addrs(&self) -> Vec<String> {
        let me = self.worker_id();
        let mut entries = match self.coord.scan_workers().await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        entries.retain(|e| e.worker_id != me && e.role != Role::Worker);
        entries.sort_by_key(|e| match e.role {
            Role::Leader => 0,
            Role::SubLeader => 1,
            Role::Worker => 2,
        });
        entries.iter().map(|e| e.addr()).collect()
    }

    /// Answer a ConfirmContinuation as leader or sub-leader: the run must
    /// still be running, still assigned to the caller, dispatched under
    /// the epoch the caller cites, and that epoch must still be current.
    pub(crate) async fn answer_continuation(
        &self,
        caller: &WorkerId,
        run_id: &RunId,
        cited_epoch: Epoch,
    ) -> Result<ContinuationVerdict, RuntimeError> {
        let current_epoch: Option<Epoch> = self
            .coord
            .get(keys::LEADER_EPOCH)
            .await?
            .and_then(|v| v.parse().ok());
        if current_epoch != Some(cited_epoch) {
            return Ok(ContinuationVerdict::MustAbort);
        }

        let Some(run) = self.store.get_run(run_id).await? else {
            return Ok(ContinuationVerdict::MustAbort);
        };
        let ok = run.state == RunState::Running
            && run.assigned_worker_id.as_ref() == Some(caller)
            && run.leader_epoch == Some(cited_epoch);
        Ok(if ok { ContinuationVerdict::AllowContinue } else { ContinuationVerdict::MustAbort })
    }
}

#[cfg(test)]
#[path = "continuation_tests.rs"]
mod tests;
